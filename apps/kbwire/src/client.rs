//! # Client
//!
//! The facade application code talks to: one method per store operation,
//! each a single correlated call over the shared connection.

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::dispatcher::RequestDispatcher;
use crate::events::{EventHandle, EventRequest, EventRouter};
use crate::transport::{TcpTransport, Transport};
use kbwire_core::requests;
use kbwire_core::{
    Addr, Construction, ElementType, KbError, LinkContent, RequestKind, Template, TemplateResult,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Connected client. Cheap to clone; every clone shares one connection,
/// which closes when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: RequestDispatcher,
    events: EventRouter,
}

impl Client {
    /// Connect over TCP to `config.endpoint`.
    pub fn connect(config: ClientConfig) -> Result<Self, KbError> {
        let transport = TcpTransport::new(config.endpoint.clone());
        Self::with_transport(config, transport)
    }

    /// Connect through an arbitrary transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: impl Transport,
    ) -> Result<Self, KbError> {
        let conn = ConnectionManager::open(config, transport)?;
        let dispatcher = RequestDispatcher::new(conn);
        Ok(Self {
            events: EventRouter::new(dispatcher.clone()),
            dispatcher,
        })
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        self.dispatcher.connection()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn events(&self) -> &EventRouter {
        &self.events
    }

    // =========================================================================
    // ELEMENTS
    // =========================================================================

    /// Type of each element; `UNKNOWN` for addresses the store does not know.
    pub async fn check_elements(&self, addrs: &[Addr]) -> Result<Vec<ElementType>, KbError> {
        if addrs.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .dispatcher
            .call(RequestKind::CheckElements, requests::addr_list(addrs))
            .await?;
        requests::decode_types(&reply, addrs.len())
    }

    /// Submit a construction. One address per command, in command order.
    pub async fn create_elements(&self, construction: &Construction) -> Result<Vec<Addr>, KbError> {
        if construction.is_empty() {
            return Ok(Vec::new());
        }
        let payload = construction.encode()?;
        let reply = self
            .dispatcher
            .call(RequestKind::CreateElements, payload)
            .await?;
        requests::decode_created(&reply, construction.len())
    }

    pub async fn delete_elements(&self, addrs: &[Addr]) -> Result<(), KbError> {
        if addrs.is_empty() {
            return Ok(());
        }
        self.dispatcher
            .call(RequestKind::DeleteElements, requests::addr_list(addrs))
            .await?;
        debug!(count = addrs.len(), "elements deleted");
        Ok(())
    }

    // =========================================================================
    // LINK CONTENT
    // =========================================================================

    /// Replace link contents. Every entry must name its link.
    pub async fn set_link_contents(&self, contents: &[LinkContent]) -> Result<Vec<bool>, KbError> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }
        let payload = requests::set_contents(contents)?;
        let reply = self.dispatcher.call(RequestKind::Content, payload).await?;
        requests::decode_set_results(&reply, contents.len())
    }

    /// Read link contents. Links without content are left out.
    pub async fn get_link_contents(&self, addrs: &[Addr]) -> Result<Vec<LinkContent>, KbError> {
        if addrs.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .dispatcher
            .call(RequestKind::Content, requests::get_contents(addrs))
            .await?;
        requests::decode_contents(&reply, addrs)
    }

    // =========================================================================
    // KEYNODES
    // =========================================================================

    /// Resolve system identifiers. Pairs with a valid type are created when
    /// missing; the others resolve to the invalid address when unknown.
    pub async fn resolve_keynodes(
        &self,
        params: &[(String, ElementType)],
    ) -> Result<Vec<(String, Addr)>, KbError> {
        if params.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .dispatcher
            .call(RequestKind::Keynodes, requests::resolve_keynodes(params))
            .await?;
        requests::decode_keynodes(&reply, params)
    }

    // =========================================================================
    // TEMPLATES
    // =========================================================================

    pub async fn template_search(
        &self,
        template: &Template,
    ) -> Result<Vec<TemplateResult>, KbError> {
        if template.is_empty() {
            return Err(KbError::invalid("cannot search with an empty template"));
        }
        let reply = self
            .dispatcher
            .call(RequestKind::SearchTemplate, template.encode())
            .await?;
        template.decode_search(&reply)
    }

    /// Generate the template's structure, with `params` binding aliases to
    /// existing elements.
    pub async fn template_generate(
        &self,
        template: &Template,
        params: &BTreeMap<String, Addr>,
    ) -> Result<TemplateResult, KbError> {
        if template.is_empty() {
            return Err(KbError::invalid("cannot generate an empty template"));
        }
        let payload = requests::generate_template(template.encode(), params);
        let reply = self
            .dispatcher
            .call(RequestKind::GenerateTemplate, payload)
            .await?;
        template.decode_generated(&reply)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub async fn events_create(
        &self,
        requests: Vec<EventRequest>,
    ) -> Result<Vec<EventHandle>, KbError> {
        self.events.subscribe_batch(requests).await
    }

    pub async fn events_destroy(&self, handles: &[EventHandle]) -> Result<(), KbError> {
        self.events.unsubscribe(handles).await
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection().state()
    }

    pub async fn wait_connected(&self) -> Result<(), KbError> {
        self.connection().wait_connected().await
    }

    pub async fn close(&self) {
        self.connection().close().await;
    }
}
