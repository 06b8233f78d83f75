//! Error types for the solver and its compute backend
//!
//! Backend failures are reported as [`ComputeError`]; everything the solver
//! surfaces to callers is an [`LbmError`]. Operations return `Result`, and the
//! solver additionally records every failure in an [`ErrorAccumulator`] that
//! callers can inspect after `init`, `reload`, `reset_fluid` or a step.

use crate::lbm::real::Precision;
use thiserror::Error;

/// Failures raised by a compute backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("buffer handle {0} does not refer to a live buffer")]
    InvalidHandle(usize),

    #[error("buffer '{label}' accessed at bytes {start}..{end}, but it holds {len} bytes")]
    OutOfRange {
        label: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("buffer '{label}' of {len} bytes cannot be viewed as elements of {element_size} bytes")]
    TypeMismatch {
        label: String,
        len: usize,
        element_size: usize,
    },

    #[error("'{command}' was enqueued without a barrier after '{previous}'")]
    MissingBarrier {
        command: String,
        previous: String,
    },

    #[error("could not allocate {bytes} bytes for buffer '{label}'")]
    AllocationFailed { label: String, bytes: usize },

    #[error("size of buffer '{label}' overflows: {count} elements of {element_size} bytes")]
    SizeOverflow {
        label: String,
        count: usize,
        element_size: usize,
    },

    #[error("invalid work size for kernel '{kernel}': global {global}, local {local}")]
    InvalidWorkSize {
        kernel: String,
        global: usize,
        local: usize,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("kernel '{kernel}' failed: {reason}")]
    KernelFailed { kernel: String, reason: String },
}

/// Errors surfaced by the free-surface solver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LbmError {
    #[error("unsupported numeric precision {requested:?} (kernels are built for {available:?})")]
    UnsupportedPrecision {
        requested: Precision,
        available: Precision,
    },

    #[error("invalid domain size {cells:?}: {reason}")]
    InvalidDomain { cells: [usize; 3], reason: String },

    #[error("readback of '{field}' needs {expected} elements, destination holds {actual}")]
    ReadbackSize {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} failed: {source}")]
    Compute {
        operation: &'static str,
        #[source]
        source: ComputeError,
    },

    #[error("solver has {0} unresolved error(s); reload before stepping")]
    Unusable(usize),
}

impl LbmError {
    /// Wrap a backend failure with the name of the operation that triggered it
    pub fn compute(operation: &'static str, source: ComputeError) -> Self {
        LbmError::Compute { operation, source }
    }
}

/// Per-object error log checked explicitly by the caller
#[derive(Debug, Default, Clone)]
pub struct ErrorAccumulator {
    errors: Vec<LbmError>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error and hand it back for propagation
    pub fn record(&mut self, error: LbmError) -> LbmError {
        log::error!("{}", error);
        self.errors.push(error.clone());
        error
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[LbmError] {
        &self.errors
    }

    /// Drain all recorded errors
    pub fn take(&mut self) -> Vec<LbmError> {
        std::mem::take(&mut self.errors)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}
