// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-call-chain trace context, preserved across asynchronous suspensions.
//!
//! Synchronous chains bind the active frame to a `thread_local!` cell;
//! async chains bind it to a `tokio::task_local!` scope that survives
//! `.await` points and work-stealing thread migration. [`current`] consults
//! the thread slot first (it is only ever populated inside a synchronous
//! scope, which always restores on exit) and falls back to the task scope.

use std::cell::RefCell;
use std::future::Future;

mod fallback;

pub use fallback::fallback_correlation;

/// One call-chain context frame.
///
/// The depth carried here is the depth at which operations executed inside
/// this frame are observed; each child frame is one deeper than its parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub depth: u32,
    /// Root id of the call tree; adopted from the first span's id.
    pub trace_id: Option<String>,
    /// Id of the enclosing span, absent at the root.
    pub parent_id: Option<String>,
    /// Id of the span owning this frame; empty for the zero frame.
    pub id: String,
    /// Request-scoped id, inherited or taken from the fallback slot.
    pub correlation_id: Option<String>,
}

impl Frame {
    /// The frame observed when no scope is active.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Derives the frame a span with `id` establishes for its body:
    /// one level deeper, the trace id adopted from this frame or from the
    /// new span, parentage pointing at this frame's span, and the
    /// correlation id inherited (falling back to the process-wide slot).
    pub fn child(&self, id: impl Into<String>) -> Frame {
        let id = id.into();
        Frame {
            depth: self.depth + 1,
            trace_id: Some(self.trace_id.clone().unwrap_or_else(|| id.clone())),
            parent_id: (!self.id.is_empty()).then(|| self.id.clone()),
            id,
            correlation_id: self
                .correlation_id
                .clone()
                .or_else(fallback_correlation::get),
        }
    }
}

tokio::task_local! {
    static ASYNC_FRAME: Frame;
}

thread_local! {
    static SYNC_FRAME: RefCell<Option<Frame>> = const { RefCell::new(None) };
}

/// Returns the active frame, or the zero frame when none is active.
pub fn current() -> Frame {
    if let Some(frame) = SYNC_FRAME.with(|cell| cell.borrow().clone()) {
        return frame;
    }
    ASYNC_FRAME.try_with(Frame::clone).unwrap_or_default()
}

/// Runs `f` with `frame` active, restoring the previous frame on all exit
/// paths including unwinding.
pub fn scope_sync<R>(frame: Frame, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Frame>);
    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            SYNC_FRAME.with(|cell| *cell.borrow_mut() = previous);
        }
    }

    let previous = SYNC_FRAME.with(|cell| cell.borrow_mut().replace(frame));
    let _restore = Restore(previous);
    f()
}

/// Runs `fut` with `frame` active for its whole execution. The binding
/// survives `.await` points; dropping the returned future releases it.
pub async fn scope<F: Future>(frame: Frame, fut: F) -> F::Output {
    ASYNC_FRAME.scope(frame, fut).await
}
