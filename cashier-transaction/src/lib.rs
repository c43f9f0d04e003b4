//! Transactional overlay backend for the cashier caching framework.
//!
//! [`TransactionBackend`] wraps any [`cashier_backend::Backend`] and adds
//! transactions: a [`TransactionBackend::transaction`] body buffers writes
//! and tombstones deletes locally, flushing them to the target only on
//! success, in one of three isolation levels ([`Mode`]). It implements
//! `Backend` itself, so it slots into a facade like any other backend —
//! outside of a `transaction` call, every operation just passes through.
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod backend;
mod builder;

pub use backend::{Mode, TransactionBackend};
pub use builder::TransactionBackendBuilder;
