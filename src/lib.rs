//! Watches the BOCM (Boletín Oficial de la Comunidad de Madrid) for
//! collective labor agreements whose registration code changed.
//!
//! A day runs as: candidate summary URLs ([`candidates`]) probed
//! concurrently ([`resolver`]), summary text ([`pdf`]) scanned for agreement
//! entries ([`detector`]), each entry reconciled against the knowledge base
//! ([`reconcile`], [`knowledge`]) and summarised ([`processor`]). Flagged
//! documents can then be fetched and verified ([`documents`]).

pub mod bulletin;
pub mod candidates;
pub mod config;
pub mod detector;
pub mod documents;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod pdf;
pub mod processor;
pub mod reconcile;
pub mod resolver;
pub mod transport;

pub use error::{BocmError, Result};
