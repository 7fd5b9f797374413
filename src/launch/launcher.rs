use crate::Result;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::trace;

/// Where an operation runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Awaited by the caller; the value is ready when `launch` returns
    #[default]
    Inline,
    /// Spawned on the runtime; `launch` returns immediately
    Background,
}

impl From<bool> for Mode {
    /// `true` means run in the background
    fn from(background: bool) -> Self {
        if background {
            Self::Background
        } else {
            Self::Inline
        }
    }
}

/// An operation that has either finished inline or is running on a task
#[derive(Debug)]
pub enum Launched<T> {
    Ready(T),
    Spawned(JoinHandle<T>),
}

impl<T> Launched<T> {
    /// True if the value is available without waiting
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Ready(_) => true,
            Self::Spawned(handle) => handle.is_finished(),
        }
    }

    pub fn is_background(&self) -> bool {
        matches!(self, Self::Spawned(_))
    }

    /// Waits for the operation and returns its value
    ///
    /// A background task that panicked is reported as `Ao3Error::Join`.
    pub async fn join(self) -> Result<T> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Spawned(handle) => Ok(handle.await?),
        }
    }
}

/// Runs `operation` according to `mode`
///
/// # Arguments
///
/// * `mode` - `Inline` awaits the operation, `Background` spawns it
/// * `operation` - Any future; its output is what `join` yields
///
/// # Returns
///
/// `Launched::Ready` with the value for inline runs, `Launched::Spawned`
/// holding the task handle for background runs.
///
/// # Example
///
/// ```no_run
/// use ao3_client::launch::{launch, Mode};
///
/// # async fn demo() -> ao3_client::Result<()> {
/// let handle = launch(Mode::Background, async { 2 + 2 }).await;
/// assert_eq!(handle.join().await?, 4);
/// # Ok(())
/// # }
/// ```
pub async fn launch<F>(mode: Mode, operation: F) -> Launched<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match mode {
        Mode::Inline => Launched::Ready(operation.await),
        Mode::Background => {
            trace!("Spawning background operation");
            Launched::Spawned(tokio::spawn(operation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ao3Error;
    use std::time::Duration;

    async fn compute(input: u32) -> u32 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        input * 3
    }

    #[tokio::test]
    async fn test_inline_returns_value() {
        let launched = launch(Mode::Inline, compute(5)).await;
        assert!(launched.is_finished());
        assert!(!launched.is_background());
        assert_eq!(launched.join().await.unwrap(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_returns_immediately() {
        let start = tokio::time::Instant::now();
        let launched = launch(Mode::Background, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            1
        })
        .await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(launched.is_background());
        assert_eq!(launched.join().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inline_and_background_agree() {
        let inline = launch(Mode::Inline, compute(7)).await.join().await.unwrap();
        let background = launch(Mode::Background, compute(7))
            .await
            .join()
            .await
            .unwrap();
        assert_eq!(inline, background);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let launched = launch(Mode::Background, async {
            Err::<u32, _>(Ao3Error::unloaded("title"))
        })
        .await;
        let value = launched.join().await.unwrap();
        assert!(matches!(value, Err(Ao3Error::Unloaded(_))));
    }

    #[tokio::test]
    async fn test_panicking_task_reports_join_error() {
        let launched = launch(Mode::Background, async {
            panic!("boom");
        })
        .await;
        let result: Result<()> = launched.join().await;
        assert!(matches!(result, Err(Ao3Error::Join(_))));
    }

    #[test]
    fn test_mode_from_bool() {
        assert_eq!(Mode::from(true), Mode::Background);
        assert_eq!(Mode::from(false), Mode::Inline);
        assert_eq!(Mode::default(), Mode::Inline);
    }
}
