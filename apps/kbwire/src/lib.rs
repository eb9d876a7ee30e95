//! # kbwire
//!
//! Async client runtime for graph knowledge stores - THE RUNTIME.
//!
//! One long-lived connection carries every request and every event push.
//! Requests are correlated by id, event pushes are routed by subscription id,
//! and a supervisor redials in the background whenever the stream fails.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     apps/kbwire (THE RUNTIME)                │
//! │                                                              │
//! │   Client ──► RequestDispatcher ──► ConnectionManager ──► net │
//! │     │              ▲                     │                   │
//! │     ├─ EventRouter ┘      replies ◄──────┤ (inbound pump)    │
//! │     └─ ReactiveSet        events  ◄──────┘                   │
//! │                                                              │
//! │                  ┌──────────────────────┐                    │
//! │                  │      kbwire-core     │                    │
//! │                  │    (THE PROTOCOL)    │                    │
//! │                  └──────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use kbwire::{Client, ClientConfig};
//! use kbwire_core::{Addr, ElementType, Template, TemplateItem};
//!
//! # async fn demo() -> Result<(), kbwire_core::KbError> {
//! let client = Client::connect(ClientConfig::new("127.0.0.1:8090"))?;
//! client.wait_connected().await?;
//!
//! let mut template = Template::new();
//! template.triple(
//!     Addr(42),
//!     TemplateItem::named(ElementType::ARC_POS_VAR_PERM, "_edge")?,
//!     TemplateItem::named(ElementType::UNKNOWN, "_item")?,
//! )?;
//! for result in client.template_search(&template).await? {
//!     println!("{}", result.get("_item")?);
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod events;
mod registry;
pub mod set;
pub mod transport;

pub use client::Client;
pub use config::{ClientConfig, ReconnectPolicy};
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatcher::RequestDispatcher;
pub use events::{EventHandle, EventRequest, EventRouter};
pub use registry::EventCallback;
pub use set::{NoopObserver, ReactiveSet, SetObserver};
pub use transport::{AsyncDuplex, BoxedStream, TcpTransport, Transport};
