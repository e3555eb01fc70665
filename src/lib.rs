//! L402 (HTTP 402 + Lightning) for Rust.
//!
//! L402 gates HTTP resources behind a Lightning payment. A server answers an
//! unpaid request with `402 Payment Required` and a challenge naming a
//! macaroon and an invoice; the client pays the invoice, and proves payment on
//! later requests with `Authorization: L402 <macaroon>:<preimage>`.
//!
//! This crate provides both ends of that exchange. Minting macaroons, creating
//! invoices, paying them, and verifying preimages are delegated to an external
//! payment provider behind the traits in [`provider`].
//!
//! # Architecture
//!
//! 1. **Client** ([`client::L402Client`]) sends a request and receives a 402
//! 2. **Client** checks the price against its per-request ceiling and its
//!    [`budget::BudgetTracker`], then asks its [`provider::L402Payer`] to pay
//! 3. **Client** caches the resulting credential in a [`store::TokenStore`] and
//!    retries the request once
//! 4. **Server** ([`server::Paywall`]) verifies the credential through its
//!    [`provider::L402Issuer`] and lets the request through
//!
//! # Feature Flags
//!
//! - `client` - Paying client, budget tracking, and credential cache
//! - `server` - Paywall gate and pricing
//! - `reqwest` - `reqwest`-backed HTTP transport and a remote JSON payment provider
//! - `tracing` - Structured log events through `tracing`
//! - `full` - All of the above
//!
//! # Usage
//!
//! ## Client: Paying for a Resource
//!
//! ```ignore
//! use l402_kit::client::{L402Client, ReqwestTransport};
//! use l402_kit::budget::BudgetConfig;
//!
//! let client = L402Client::new(ReqwestTransport::new(), wallet)
//!     .with_max_per_request(100)
//!     .with_budget(BudgetConfig::per_period(10_000, Duration::from_secs(86_400)));
//!
//! let response = client.get("https://api.example.com/premium").await?;
//! ```
//!
//! ## Server: Gating a Handler
//!
//! ```ignore
//! use l402_kit::server::{Paywall, PaywallConfig, Pricing};
//!
//! let paywall = Paywall::new(issuer, Pricing::Fixed(10))
//!     .with_config(PaywallConfig::new("Premium market data"));
//!
//! let response = paywall.handle(request, handler).await?;
//! ```

pub mod header;
pub mod provider;
pub mod types;

#[cfg(feature = "client")]
pub mod budget;
#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod store;

#[cfg(feature = "server")]
pub mod server;

pub use types::{Credential, ErrorKind, L402Error};

#[cfg(feature = "client")]
pub use budget::{BudgetConfig, BudgetReservation, BudgetTracker};
#[cfg(feature = "client")]
pub use client::{ClientConfig, L402Client, L402Request};
#[cfg(feature = "client")]
pub use store::{MemoryTokenStore, TokenStore};

#[cfg(feature = "server")]
pub use server::{L402Payment, Paywall, PaywallConfig, Pricing};
