#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for HTTP 402 payment negotiation.
//!
//! This crate holds everything the buyer side and the seller side agree on:
//! the wire messages, the envelope codec used to carry them in HTTP headers,
//! the error taxonomy, and the contract a facilitator fulfils.
//!
//! # Overview
//!
//! A seller answers an unpaid request with `402 Payment Required` and a list of
//! [`proto::Requirement`] offers. The buyer picks one, signs an
//! [`proto::Authorization`] for it, and retries with the authorization in the
//! `X-PAYMENT` header. The seller asks a facilitator to verify and settle the
//! authorization, and returns the [`proto::SettlementResult`] in the
//! `X-PAYMENT-RESPONSE` header.
//!
//! # Modules
//!
//! - [`config`] - Literal-or-environment configuration values
//! - [`envelope`] - Base64 JSON envelopes for header transport
//! - [`error`] - The shared error taxonomy
//! - [`facilitator`] - The verify/settle contract
//! - [`networks`] - Registry of well-known networks
//! - [`proto`] - Wire format types
//! - [`requirement`] - Building offers from configuration
//! - [`util`] - Base64 and money amount helpers

pub mod config;
pub mod envelope;
pub mod error;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod requirement;
pub mod util;
