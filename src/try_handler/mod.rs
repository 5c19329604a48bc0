//! Reusable "try block" with before / after / finally hooks and an error sink.
//!
//! A [`TryHandler`] centralizes what a call site does around a fallible
//! operation: log the error, run cleanup, substitute a fallback value. The
//! operation itself is any closure or future returning a `Result`.
//!
//! Hook order for every call:
//!
//! 1. `before`
//! 2. the operation
//! 3. on success: `after`; on failure: the handler's error sink, then the
//!    per-call error sink (if any)
//! 4. `finally`, which also runs if the operation panics
//!
//! # Examples
//!
//! ```
//! use taskq::try_handler::TryHandler;
//!
//! let handler = TryHandler::new(|e| eprintln!("failed: {e}"));
//!
//! let parsed = handler.try_run(|| "42".parse::<u32>());
//! assert!(parsed.is_success());
//! assert_eq!(parsed.value(), Some(&42));
//!
//! let fallback = handler.try_fallback(7, || "x".parse::<u32>());
//! assert!(!fallback.is_success());
//! assert_eq!(fallback.into_value(), Some(7));
//! ```

use std::error::Error;
use std::fmt;
use std::future::Future;

use tracing::debug;

type Hook = Box<dyn Fn() + Send + Sync>;
type ErrorSink = Box<dyn Fn(&dyn Error) + Send + Sync>;

/// Outcome of a [`TryHandler`] call.
///
/// `value` is `None` after a failed [`TryHandler::try_run`], and always present
/// after [`TryHandler::try_ensure`] or [`TryHandler::try_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryResult<T> {
    success: bool,
    value: Option<T>,
}

impl<T> TryResult<T> {
    fn success(value: T) -> Self {
        Self {
            success: true,
            value: Some(value),
        }
    }

    fn failure() -> Self {
        Self {
            success: false,
            value: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    // Substitutes `fallback` for a missing value; `success` is unchanged.
    fn or_value(self, fallback: impl FnOnce() -> T) -> Self {
        Self {
            success: self.success,
            value: Some(self.value.unwrap_or_else(fallback)),
        }
    }
}

impl<T> From<&TryResult<T>> for bool {
    fn from(result: &TryResult<T>) -> bool {
        result.success
    }
}

impl<T> From<TryResult<T>> for bool {
    fn from(result: TryResult<T>) -> bool {
        result.success
    }
}

/// Runs fallible operations between shared hooks.
pub struct TryHandler {
    before: Option<Hook>,
    after: Option<Hook>,
    finally: Option<Hook>,
    on_error: ErrorSink,
}

impl TryHandler {
    /// Creates a handler whose failures are reported to `on_error`.
    pub fn new<F>(on_error: F) -> Self
    where
        F: Fn(&dyn Error) + Send + Sync + 'static,
    {
        Self {
            before: None,
            after: None,
            finally: None,
            on_error: Box::new(on_error),
        }
    }

    /// Runs `hook` before every operation.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Runs `hook` after every successful operation.
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// Runs `hook` after every operation, successful or not.
    pub fn finally<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.finally = Some(Box::new(hook));
        self
    }

    /// Runs `op` between the hooks.
    pub fn try_run<T, E, F>(&self, op: F) -> TryResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
    {
        self.try_run_with(op, |_| {})
    }

    /// Like [`try_run`](Self::try_run), also reporting a failure to `on_error`
    /// after the handler's own sink.
    pub fn try_run_with<T, E, F, L>(&self, op: F, on_error: L) -> TryResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
        L: FnOnce(&E),
    {
        let _finally = Finally(self.finally.as_ref());
        run_hook(self.before.as_ref());
        let result = op();
        self.settle(result, on_error)
    }

    /// Runs `op`; on failure the value is `T::default()`.
    pub fn try_ensure<T, E, F>(&self, op: F) -> TryResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
        T: Default,
    {
        self.try_ensure_with(op, |_| {})
    }

    /// [`try_ensure`](Self::try_ensure) with a per-call error sink.
    pub fn try_ensure_with<T, E, F, L>(&self, op: F, on_error: L) -> TryResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
        L: FnOnce(&E),
        T: Default,
    {
        self.try_run_with(op, on_error).or_value(T::default)
    }

    /// Runs `op`; on failure the value is `fallback`.
    pub fn try_fallback<T, E, F>(&self, fallback: T, op: F) -> TryResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
    {
        self.try_fallback_with(fallback, op, |_| {})
    }

    /// [`try_fallback`](Self::try_fallback) with a per-call error sink.
    pub fn try_fallback_with<T, E, F, L>(&self, fallback: T, op: F, on_error: L) -> TryResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
        L: FnOnce(&E),
    {
        self.try_run_with(op, on_error).or_value(|| fallback)
    }

    /// Awaits `op` between the hooks.
    pub async fn try_run_async<T, E, Fut>(&self, op: Fut) -> TryResult<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error,
    {
        self.try_run_async_with(op, |_| {}).await
    }

    /// Async form of [`try_run_with`](Self::try_run_with).
    pub async fn try_run_async_with<T, E, Fut, L>(&self, op: Fut, on_error: L) -> TryResult<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error,
        L: FnOnce(&E),
    {
        let _finally = Finally(self.finally.as_ref());
        run_hook(self.before.as_ref());
        let result = op.await;
        self.settle(result, on_error)
    }

    /// Async form of [`try_ensure`](Self::try_ensure).
    pub async fn try_ensure_async<T, E, Fut>(&self, op: Fut) -> TryResult<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error,
        T: Default,
    {
        self.try_ensure_async_with(op, |_| {}).await
    }

    /// Async form of [`try_ensure_with`](Self::try_ensure_with).
    pub async fn try_ensure_async_with<T, E, Fut, L>(&self, op: Fut, on_error: L) -> TryResult<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error,
        L: FnOnce(&E),
        T: Default,
    {
        self.try_run_async_with(op, on_error)
            .await
            .or_value(T::default)
    }

    /// Async form of [`try_fallback`](Self::try_fallback).
    pub async fn try_fallback_async<T, E, Fut>(&self, fallback: T, op: Fut) -> TryResult<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error,
    {
        self.try_fallback_async_with(fallback, op, |_| {}).await
    }

    /// Async form of [`try_fallback_with`](Self::try_fallback_with).
    pub async fn try_fallback_async_with<T, E, Fut, L>(
        &self,
        fallback: T,
        op: Fut,
        on_error: L,
    ) -> TryResult<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error,
        L: FnOnce(&E),
    {
        self.try_run_async_with(op, on_error)
            .await
            .or_value(|| fallback)
    }

    fn settle<T, E, L>(&self, result: Result<T, E>, on_error: L) -> TryResult<T>
    where
        E: Error,
        L: FnOnce(&E),
    {
        match result {
            Ok(value) => {
                run_hook(self.after.as_ref());
                TryResult::success(value)
            }
            Err(e) => {
                debug!(error = %e, "try block failed");
                (self.on_error)(&e);
                on_error(&e);
                TryResult::failure()
            }
        }
    }
}

impl fmt::Debug for TryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryHandler")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("finally", &self.finally.is_some())
            .finish_non_exhaustive()
    }
}

fn run_hook(hook: Option<&Hook>) {
    if let Some(hook) = hook {
        hook();
    }
}

// Runs the `finally` hook on drop, covering early exit by panic.
struct Finally<'a>(Option<&'a Hook>);

impl Drop for Finally<'_> {
    fn drop(&mut self) {
        run_hook(self.0);
    }
}

#[cfg(test)]
mod tests {
    use std::num::ParseIntError;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, entry: &'static str) -> impl Fn() + Send + Sync + 'static {
        let log = Arc::clone(log);
        move || log.lock().unwrap().push(entry.to_owned())
    }

    fn handler(log: &Log) -> TryHandler {
        let errors = Arc::clone(log);
        TryHandler::new(move |e| errors.lock().unwrap().push(format!("error: {e}")))
            .before(recorder(log, "before"))
            .after(recorder(log, "after"))
            .finally(recorder(log, "finally"))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn parse(s: &str) -> Result<u32, ParseIntError> {
        s.parse()
    }

    #[test]
    fn success_runs_before_after_finally() {
        let log = Log::default();
        let result = handler(&log).try_run(|| parse("5"));

        assert!(result.is_success());
        assert_eq!(result.into_value(), Some(5));
        assert_eq!(entries(&log), ["before", "after", "finally"]);
    }

    #[test]
    fn failure_skips_after_and_reports_error() {
        let log = Log::default();
        let result = handler(&log).try_run(|| parse("five"));

        assert!(!bool::from(&result));
        assert_eq!(result.value(), None);
        assert_eq!(
            entries(&log),
            ["before", "error: invalid digit found in string", "finally"]
        );
    }

    #[test]
    fn local_sink_runs_after_handler_sink() {
        let log = Log::default();
        let local = Arc::clone(&log);
        let result = handler(&log).try_run_with(
            || parse(""),
            move |e| local.lock().unwrap().push(format!("local: {e}")),
        );

        assert!(!result.is_success());
        assert_eq!(
            entries(&log),
            [
                "before",
                "error: cannot parse integer from empty string",
                "local: cannot parse integer from empty string",
                "finally",
            ]
        );
    }

    #[test]
    fn local_sink_not_called_on_success() {
        let log = Log::default();
        let mut called = false;
        handler(&log).try_run_with(|| parse("1"), |_| called = true);
        assert!(!called);
    }

    #[test]
    fn ensure_yields_default_on_failure() {
        let log = Log::default();
        let result = handler(&log).try_ensure(|| parse("nope"));
        assert!(!result.is_success());
        assert_eq!(result.into_value(), Some(0));
    }

    #[test]
    fn ensure_keeps_value_on_success() {
        let log = Log::default();
        let result = handler(&log).try_ensure(|| parse("12"));
        assert!(result.is_success());
        assert_eq!(result.into_value(), Some(12));
    }

    #[test]
    fn ensure_with_reports_to_local_sink() {
        let log = Log::default();
        let mut seen = None;
        let result =
            handler(&log).try_ensure_with(|| parse("x1"), |e| seen = Some(e.to_string()));

        assert!(!result.is_success());
        assert_eq!(result.into_value(), Some(0));
        assert_eq!(seen.as_deref(), Some("invalid digit found in string"));
    }

    #[test]
    fn ensure_with_skips_local_sink_on_success() {
        let log = Log::default();
        let mut called = false;
        let result = handler(&log).try_ensure_with(|| parse("4"), |_| called = true);

        assert_eq!(result.into_value(), Some(4));
        assert!(!called);
    }

    #[test]
    fn fallback_with_reports_to_local_sink() {
        let log = Log::default();
        let local = Arc::clone(&log);
        let result = handler(&log).try_fallback_with(
            13,
            || parse(""),
            move |e| local.lock().unwrap().push(format!("local: {e}")),
        );

        assert!(!result.is_success());
        assert_eq!(result.into_value(), Some(13));
        assert_eq!(
            entries(&log),
            [
                "before",
                "error: cannot parse integer from empty string",
                "local: cannot parse integer from empty string",
                "finally",
            ]
        );
    }

    #[test]
    fn fallback_yields_fallback_on_failure() {
        let log = Log::default();
        let result = handler(&log).try_fallback(99, || parse("-"));
        assert!(!result.is_success());
        assert_eq!(result.into_value(), Some(99));
    }

    #[test]
    fn finally_runs_on_panic() {
        let log = Log::default();
        let handler = handler(&log);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.try_run(|| -> Result<u32, ParseIntError> { panic!("boom") })
        }));

        assert!(outcome.is_err());
        assert_eq!(entries(&log), ["before", "finally"]);
    }

    #[test]
    fn hooks_are_optional() {
        let handler = TryHandler::new(|_| {});
        assert!(handler.try_run(|| parse("3")).is_success());
        assert_eq!(
            format!("{handler:?}"),
            "TryHandler { before: false, after: false, finally: false, .. }"
        );
    }

    #[tokio::test]
    async fn async_success_and_failure() {
        let log = Log::default();
        let handler = handler(&log);

        let ok = handler.try_run_async(async { parse("8") }).await;
        assert_eq!(ok.into_value(), Some(8));

        let failed = handler.try_fallback_async(1, async { parse("x") }).await;
        assert!(!failed.is_success());
        assert_eq!(failed.into_value(), Some(1));

        assert_eq!(
            entries(&log),
            [
                "before",
                "after",
                "finally",
                "before",
                "error: invalid digit found in string",
                "finally",
            ]
        );
    }

    #[tokio::test]
    async fn async_ensure_yields_default_on_failure() {
        let log = Log::default();
        let handler = handler(&log);

        let failed = handler.try_ensure_async(async { parse("z") }).await;
        assert!(!failed.is_success());
        assert_eq!(failed.into_value(), Some(0));

        let ok = handler.try_ensure_async(async { parse("21") }).await;
        assert!(ok.is_success());
        assert_eq!(ok.into_value(), Some(21));
    }

    #[tokio::test]
    async fn async_ensure_and_fallback_with_local_sinks() {
        let log = Log::default();
        let handler = handler(&log);
        let mut errors = Vec::new();

        let ensured = handler
            .try_ensure_async_with(async { parse("a") }, |e| errors.push(e.to_string()))
            .await;
        assert_eq!(ensured.into_value(), Some(0));

        let fallback = handler
            .try_fallback_async_with(5, async { parse("") }, |e| errors.push(e.to_string()))
            .await;
        assert!(!fallback.is_success());
        assert_eq!(fallback.into_value(), Some(5));

        assert_eq!(
            errors,
            [
                "invalid digit found in string",
                "cannot parse integer from empty string",
            ]
        );
    }

    #[tokio::test]
    async fn async_local_sink() {
        let log = Log::default();
        let mut seen = None;
        let result = handler(&log)
            .try_run_async_with(async { parse("?") }, |e| seen = Some(e.to_string()))
            .await;
        assert!(!result.is_success());
        assert_eq!(seen.as_deref(), Some("invalid digit found in string"));
    }
}
