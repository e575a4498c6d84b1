/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines progress reporting messages, sinks, and helper functions for long-running processes.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Progress reporting primitives for long-running computations.
//!
//! Node generation, operator assembly, time integration and filtering all
//! accept an optional [`ProgressSink`]. The simplest way to observe them is
//! [`closure_sink`], which runs a handler on a listener thread:
//!
//! ```
//! use rbf_fd::progress::{closure_sink, ProgressMsg};
//!
//! let (sink, listener) = closure_sink(64, |msg: ProgressMsg| println!("{msg}"));
//! sink.emit(ProgressMsg::Message { message: "starting".into() });
//! drop(sink);
//! listener.join().unwrap();
//! ```

use std::fmt::{self, Debug};
use std::sync::{Arc, mpsc};
use std::thread;

/// Progress events emitted during long-running computations.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMsg {
    /// A node dispersal round finished.
    NodeDispersal { iteration: usize, total: usize },

    /// A sparse differentiation operator was assembled.
    OperatorAssembled { name: String, rows: usize, nnz: usize },

    /// The integrator reached an output time.
    IntegrationCheckpoint { time: f64, steps: usize, progress: f64 },

    /// A bootstrap sample of the filter was solved.
    FilterSample { sample: usize, total: usize },

    /// Arbitrary informational message.
    Message { message: String },
}

impl fmt::Display for ProgressMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressMsg::NodeDispersal { iteration, total } => {
                write!(f, "dispersal {iteration}/{total}")
            }
            ProgressMsg::OperatorAssembled { name, rows, nnz } => {
                write!(f, "assembled {name}: {rows} rows, {nnz} non-zeros")
            }
            ProgressMsg::IntegrationCheckpoint {
                time,
                steps,
                progress,
            } => write!(
                f,
                "t = {time:.4} after {steps} steps ({:.0}%)",
                100.0 * progress
            ),
            ProgressMsg::FilterSample { sample, total } => {
                write!(f, "filter sample {sample}/{total}")
            }
            ProgressMsg::Message { message } => f.write_str(message),
        }
    }
}

/// Sink that consumes progress messages.
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, msg: ProgressMsg);
}

/// Progress sink that forwards messages over a channel.
#[derive(Debug)]
pub struct ClosureSink {
    tx: mpsc::SyncSender<ProgressMsg>,
}

impl ProgressSink for ClosureSink {
    #[inline]
    fn emit(&self, msg: ProgressMsg) {
        let _ = self.tx.try_send(msg);
    }
}

/// Spawns a listener thread that runs a handler closure for each progress message.
///
/// Messages are dropped rather than blocking the computation when the
/// bounded buffer is full.
pub fn closure_sink<F>(
    buffer: usize,
    mut handler: F,
) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>)
where
    F: FnMut(ProgressMsg) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<ProgressMsg>(buffer.max(1));
    let sink: Arc<dyn ProgressSink> = Arc::new(ClosureSink { tx });

    let handle = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            handler(msg);
        }
    });

    (sink, handle)
}

/// Emits `msg` when a sink is installed.
#[inline]
pub(crate) fn report(sink: &Option<Arc<dyn ProgressSink>>, msg: ProgressMsg) {
    if let Some(sink) = sink {
        sink.emit(msg);
    }
}

/// Fraction of the interval `[start, end]` covered at `current`, clamped to `[0, 1]`.
#[inline]
pub(crate) fn progress_from_time(current: f64, start: f64, end: f64) -> f64 {
    if end == start {
        1.0
    } else {
        ((current - start) / (end - start)).clamp(0.0, 1.0)
    }
}
