use crate::ProcessMemoryAdapter;

/// Scoped acquisition guard around a paused target (spec.md §5).
///
/// Construction pauses the adapter; resume is guaranteed on every exit
/// path from the guarded scope via `Drop`, including early returns and
/// panics unwinding through the scope.
pub struct PauseGuard<'a, A: ProcessMemoryAdapter> {
    adapter: &'a mut A,
}

impl<'a, A: ProcessMemoryAdapter> PauseGuard<'a, A> {
    pub fn new(adapter: &'a mut A) -> Result<Self, crate::CoreError> {
        adapter.pause()?;
        Ok(Self { adapter })
    }

    pub fn adapter(&mut self) -> &mut A {
        self.adapter
    }
}

impl<A: ProcessMemoryAdapter> Drop for PauseGuard<'_, A> {
    fn drop(&mut self) {
        if let Err(err) = self.adapter.resume() {
            log::warn!("failed to resume target after guarded scope: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FakeAdapter;

    #[test]
    fn resume_runs_on_every_exit_path() {
        let mut adapter = FakeAdapter::new();
        {
            let _guard = PauseGuard::new(&mut adapter).expect("pause");
        }
        assert_eq!(adapter.pause_count, 1);
        assert_eq!(adapter.resume_count, 1);
    }

    #[test]
    fn resume_runs_on_early_return() {
        let mut adapter = FakeAdapter::new();

        fn scoped(adapter: &mut FakeAdapter) -> Option<()> {
            let _guard = PauseGuard::new(adapter).ok()?;
            None
        }

        scoped(&mut adapter);
        assert_eq!(adapter.pause_count, 1);
        assert_eq!(adapter.resume_count, 1);
    }
}
