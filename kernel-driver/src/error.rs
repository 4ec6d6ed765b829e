//! Error taxonomy of the unhooker engine.

use thiserror::Error;

use crate::consts::{
    NtStatus, STATUS_BUFFER_OVERFLOW, STATUS_INSUFFICIENT_RESOURCES, STATUS_INTERNAL_ERROR,
    STATUS_INVALID_DEVICE_REQUEST, STATUS_UNSUCCESSFUL,
};

/// Which collaborator failed to come up before a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Baseline,
    Resolver,
}

impl std::fmt::Display for InitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitStage::Baseline => f.write_str("baseline"),
            InitStage::Resolver => f.write_str("symbol resolver"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrvError {
    /// Task or queue node could not be allocated; only the requested
    /// operation fails.
    #[error("allocation failed")]
    AllocationFailure,

    /// Baseline or resolver setup failed; the table was not touched.
    #[error("{stage} initialisation failed (status {status:#010x})")]
    InitFailure { stage: InitStage, status: NtStatus },

    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The task queue is corrupted or closed; the worker no longer runs.
    #[error("task queue failure")]
    QueueFailure,

    #[error("invalid device request {0:#010x}")]
    InvalidRequest(u32),
}

impl DrvError {
    /// Status the request is completed with.
    pub fn status(&self) -> NtStatus {
        match self {
            DrvError::AllocationFailure => STATUS_INSUFFICIENT_RESOURCES,
            DrvError::InitFailure { status, .. } if *status < 0 => *status,
            DrvError::InitFailure { .. } => STATUS_UNSUCCESSFUL,
            DrvError::BufferTooSmall { .. } => STATUS_BUFFER_OVERFLOW,
            DrvError::QueueFailure => STATUS_INTERNAL_ERROR,
            DrvError::InvalidRequest(_) => STATUS_INVALID_DEVICE_REQUEST,
        }
    }
}

pub type DrvResult<T> = Result<T, DrvError>;
