// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message Bus
//!
//! Per-agent prioritised mailboxes with direct, multicast and broadcast
//! delivery, synchronous subscriber callbacks and request/response
//! correlation.
//!
//! Ordering: within one mailbox messages are kept critical > high > normal >
//! low, first-in-first-out among equal priorities. A full mailbox evicts its
//! oldest message before accepting a new one.
//!
//! Expiry: a message past its `expires_at` is never handed out. The periodic
//! sweep drops expired messages from the registry and from every mailbox;
//! `receive`/`peek` also skip anything that expired since the last sweep.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** In-process agent messaging

use crate::domain::message::{AgentMessage, MessageError, MessagePayload, MessagePriority, MessageTarget};
use chrono::Utc;
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::config::MessagingConfig;
use genesis_core::domain::events::CoordinationEventKind;
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback invoked synchronously for every message enqueued to an agent.
pub type MessageHandler = Arc<dyn Fn(&AgentMessage) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

struct RegistryEntry {
    message: AgentMessage,
    /// Mailboxes still holding this message.
    pending: usize,
}

#[derive(Default)]
struct BusState {
    registry: HashMap<Uuid, RegistryEntry>,
    mailboxes: HashMap<AgentId, Vec<AgentMessage>>,
    handlers: HashMap<AgentId, Vec<(SubscriptionId, MessageHandler)>>,
    sent_total: u64,
    delivered_total: u64,
    evicted_total: u64,
    expired_total: u64,
    handler_failures: u64,
}

impl BusState {
    /// One mailbox copy of `id` is gone. Returns `true` once it was the last.
    fn release(&mut self, id: &Uuid) -> bool {
        let Some(entry) = self.registry.get_mut(id) else {
            return false;
        };
        entry.pending = entry.pending.saturating_sub(1);
        if entry.pending == 0 {
            self.registry.remove(id);
            return true;
        }
        false
    }

    /// Drop expired messages from one mailbox, returning how many distinct
    /// messages left the registry as a result.
    fn purge_mailbox(&mut self, agent: &AgentId, now: chrono::DateTime<Utc>) -> usize {
        let Some(mailbox) = self.mailboxes.get_mut(agent) else {
            return 0;
        };
        let mut expired = Vec::new();
        mailbox.retain(|m| {
            let gone = m.is_expired_at(now);
            if gone {
                expired.push(m.id);
            }
            !gone
        });
        expired.iter().filter(|id| self.release(id)).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBusStats {
    pub mailboxes: usize,
    pub queued_messages: usize,
    pub registry_size: usize,
    pub subscriptions: usize,
    pub sent_total: u64,
    pub delivered_total: u64,
    pub evicted_total: u64,
    /// Distinct messages dropped on expiry; a broadcast counts once no
    /// matter how many mailboxes held it.
    pub expired_total: u64,
    pub handler_failures: u64,
}

pub struct MessageBus {
    config: MessagingConfig,
    state: Mutex<BusState>,
    enqueued: Notify,
    events: EventBus,
}

impl MessageBus {
    pub fn new(config: MessagingConfig, events: EventBus) -> Self {
        Self {
            config,
            state: Mutex::new(BusState::default()),
            enqueued: Notify::new(),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Create an empty mailbox. Returns `false` if one already exists.
    pub fn register_mailbox(&self, agent: &AgentId) -> bool {
        let mut state = self.state.lock();
        if state.mailboxes.contains_key(agent) {
            return false;
        }
        state.mailboxes.insert(agent.clone(), Vec::new());
        debug!(agent_id = %agent, "Mailbox registered");
        true
    }

    /// Remove a mailbox and its subscriptions; returns the undelivered count.
    pub fn unregister_mailbox(&self, agent: &AgentId) -> usize {
        let mut state = self.state.lock();
        state.handlers.remove(agent);
        let dropped = state.mailboxes.remove(agent).unwrap_or_default();
        for message in &dropped {
            state.release(&message.id);
        }
        dropped.len()
    }

    pub fn registered_agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.state.lock().mailboxes.keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn send(
        &self,
        from: &AgentId,
        to: impl Into<MessageTarget>,
        payload: MessagePayload,
        priority: MessagePriority,
        correlation_id: Option<Uuid>,
    ) -> Result<AgentMessage, MessageError> {
        let mut message = AgentMessage::new(from.clone(), to, payload).with_priority(priority);
        message.correlation_id = correlation_id;
        self.send_message(message)
    }

    /// Deliver a fully built message. Every explicit recipient must have a
    /// mailbox; nothing is delivered otherwise.
    pub fn send_message(&self, mut message: AgentMessage) -> Result<AgentMessage, MessageError> {
        if message.expires_at.is_none() {
            if let Some(ttl) = self.config.default_ttl() {
                message = message.with_ttl(ttl);
            }
        }

        let (recipients, evicted, handlers) = {
            let mut state = self.state.lock();
            let recipients = Self::resolve_recipients(&state, &message)?;

            let mut evicted = Vec::new();
            for recipient in &recipients {
                let mailbox = state.mailboxes.entry(recipient.clone()).or_default();
                if let Some(old) = Self::enqueue(mailbox, message.clone(), self.config.max_queue_size) {
                    evicted.push((recipient.clone(), old));
                }
            }
            for (_, old) in &evicted {
                state.release(&old.id);
            }
            if !recipients.is_empty() {
                state.registry.insert(
                    message.id,
                    RegistryEntry {
                        message: message.clone(),
                        pending: recipients.len(),
                    },
                );
            }

            state.sent_total += 1;
            state.delivered_total += recipients.len() as u64;
            state.evicted_total += evicted.len() as u64;

            let handlers: Vec<(AgentId, MessageHandler)> = recipients
                .iter()
                .flat_map(|r| {
                    state
                        .handlers
                        .get(r)
                        .into_iter()
                        .flatten()
                        .map(move |(_, h)| (r.clone(), h.clone()))
                })
                .collect();
            (recipients, evicted, handlers)
        };

        self.enqueued.notify_waiters();
        metrics::counter!("genesis_messages_sent_total", "priority" => message.priority.to_string()).increment(1);
        debug!(
            message_id = %message.id,
            from = %message.from,
            message_type = message.payload.type_tag(),
            priority = %message.priority,
            recipients = recipients.len(),
            "Message sent"
        );
        self.events.publish_agent_event(
            &message.from,
            CoordinationEventKind::MessageSent {
                message_id: message.id,
                message_type: message.payload.type_tag().to_string(),
                recipients: recipients.len(),
            },
        );

        for (recipient, old) in &evicted {
            warn!(agent_id = %recipient, message_id = %old.id, "Mailbox full, evicted oldest message");
            metrics::counter!("genesis_messages_evicted_total").increment(1);
            self.events
                .publish_agent_event(recipient, CoordinationEventKind::MessageEvicted { message_id: old.id });
        }

        self.invoke_handlers(&message, handlers);
        Ok(message)
    }

    fn resolve_recipients(state: &BusState, message: &AgentMessage) -> Result<Vec<AgentId>, MessageError> {
        let recipients = match &message.to {
            MessageTarget::Agent(agent) => vec![agent.clone()],
            MessageTarget::Agents(agents) => {
                let mut unique: Vec<AgentId> = Vec::with_capacity(agents.len());
                for agent in agents {
                    if !unique.contains(agent) {
                        unique.push(agent.clone());
                    }
                }
                unique
            }
            MessageTarget::Broadcast => {
                let mut all: Vec<AgentId> = state
                    .mailboxes
                    .keys()
                    .filter(|a| **a != message.from)
                    .cloned()
                    .collect();
                all.sort();
                all
            }
        };

        if let Some(missing) = recipients.iter().find(|a| !state.mailboxes.contains_key(*a)) {
            return Err(MessageError::UnknownRecipient(missing.clone()));
        }
        Ok(recipients)
    }

    /// Insert by priority after any equal-priority messages; evict the oldest
    /// message first when the mailbox is full.
    fn enqueue(mailbox: &mut Vec<AgentMessage>, message: AgentMessage, max: usize) -> Option<AgentMessage> {
        let evicted = if mailbox.len() >= max.max(1) {
            mailbox
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| m.timestamp)
                .map(|(i, _)| i)
                .map(|i| mailbox.remove(i))
        } else {
            None
        };

        let position = mailbox
            .iter()
            .position(|m| m.priority < message.priority)
            .unwrap_or(mailbox.len());
        mailbox.insert(position, message);
        evicted
    }

    fn invoke_handlers(&self, message: &AgentMessage, handlers: Vec<(AgentId, MessageHandler)>) {
        for (recipient, handler) in handlers {
            let error = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "handler panicked".to_string(),
            };

            warn!(agent_id = %recipient, message_id = %message.id, error = %error, "Message handler failed");
            self.state.lock().handler_failures += 1;
            self.events.publish_agent_event(
                &recipient,
                CoordinationEventKind::HandlerFailed {
                    message_id: message.id,
                    error,
                },
            );
        }
    }

    /// Take up to `limit` messages (all when `None`) in priority order.
    pub fn receive(&self, agent: &AgentId, limit: Option<usize>) -> Result<Vec<AgentMessage>, MessageError> {
        let mut state = self.state.lock();
        if !state.mailboxes.contains_key(agent) {
            return Err(MessageError::UnknownAgent(agent.clone()));
        }
        let expired = state.purge_mailbox(agent, Utc::now());
        state.expired_total += expired as u64;
        if expired > 0 {
            metrics::counter!("genesis_messages_expired_total").increment(expired as u64);
        }

        let taken: Vec<AgentMessage> = match state.mailboxes.get_mut(agent) {
            Some(mailbox) => {
                let count = limit.unwrap_or(mailbox.len()).min(mailbox.len());
                mailbox.drain(..count).collect()
            }
            None => Vec::new(),
        };
        for message in &taken {
            state.release(&message.id);
        }
        Ok(taken)
    }

    /// Unexpired messages in delivery order, without removing them.
    pub fn peek(&self, agent: &AgentId) -> Result<Vec<AgentMessage>, MessageError> {
        let now = Utc::now();
        let state = self.state.lock();
        let mailbox = state
            .mailboxes
            .get(agent)
            .ok_or_else(|| MessageError::UnknownAgent(agent.clone()))?;
        Ok(mailbox.iter().filter(|m| !m.is_expired_at(now)).cloned().collect())
    }

    pub fn queue_len(&self, agent: &AgentId) -> usize {
        self.state.lock().mailboxes.get(agent).map_or(0, Vec::len)
    }

    /// Registry lookup; the entry lives until every recipient has taken it.
    pub fn get_message(&self, id: &Uuid) -> Option<AgentMessage> {
        self.state.lock().registry.get(id).map(|e| e.message.clone())
    }

    pub fn subscribe<F>(&self, agent: &AgentId, handler: F) -> SubscriptionId
    where
        F: Fn(&AgentMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.state
            .lock()
            .handlers
            .entry(agent.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, agent: &AgentId, subscription: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let Some(handlers) = state.handlers.get_mut(agent) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription);
        before != handlers.len()
    }

    /// Send a query to `to` and wait for the correlated response in
    /// `from`'s mailbox.
    pub async fn request(
        &self,
        from: &AgentId,
        to: &AgentId,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<AgentMessage, MessageError> {
        if !self.state.lock().mailboxes.contains_key(from) {
            return Err(MessageError::UnknownAgent(from.clone()));
        }

        let correlation_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = super::deadline_after(started, timeout);
        self.send(
            from,
            to,
            MessagePayload::Query(body),
            MessagePriority::High,
            Some(correlation_id),
        )?;

        loop {
            let notified = self.enqueued.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let now = Utc::now();
                let mut state = self.state.lock();
                let found = state.mailboxes.get_mut(from).and_then(|mailbox| {
                    mailbox
                        .iter()
                        .position(|m| m.is_response_to(correlation_id) && !m.is_expired_at(now))
                        .map(|i| mailbox.remove(i))
                });
                if let Some(response) = found {
                    state.release(&response.id);
                    return Ok(response);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(started).as_millis() as u64;
                warn!(from = %from, to = %to, waited_ms, "Request timed out");
                return Err(MessageError::Timeout {
                    to: to.clone(),
                    waited_ms,
                });
            }
            let wake_at = deadline.min(now + self.config.request_poll());
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    /// Answer a query, carrying its correlation id back to the sender.
    pub fn respond(
        &self,
        original: &AgentMessage,
        from: &AgentId,
        body: serde_json::Value,
    ) -> Result<AgentMessage, MessageError> {
        let correlation_id = original.correlation_id.unwrap_or(original.id);
        self.send(
            from,
            &original.from,
            MessagePayload::Response(body),
            MessagePriority::High,
            Some(correlation_id),
        )
    }

    /// Drop expired messages everywhere. Returns the number of distinct
    /// messages removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let removed = {
            let mut state = self.state.lock();
            let expired_ids: Vec<Uuid> = state
                .registry
                .iter()
                .filter(|(_, e)| e.message.is_expired_at(now))
                .map(|(id, _)| *id)
                .collect();
            for id in &expired_ids {
                state.registry.remove(id);
            }
            for mailbox in state.mailboxes.values_mut() {
                mailbox.retain(|m| !m.is_expired_at(now));
            }
            state.expired_total += expired_ids.len() as u64;
            expired_ids.len()
        };

        if removed > 0 {
            info!(count = removed, "Expired messages swept");
            metrics::counter!("genesis_messages_expired_total").increment(removed as u64);
            self.events
                .publish_system_event(CoordinationEventKind::MessagesExpired { count: removed });
        }
        removed
    }

    pub fn start_expiry_sweep(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_ms = self.config.expiry_check_ms, "Starting message expiry sweep");
            let mut tick = tokio::time::interval(self.config.expiry_check());
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        self.sweep_expired();
                    }
                    _ = shutdown.cancelled() => {
                        info!("Message expiry sweep shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> MessageBusStats {
        let state = self.state.lock();
        let queued_messages = state.mailboxes.values().map(Vec::len).sum();
        metrics::gauge!("genesis_messages_queued").set(queued_messages as f64);
        MessageBusStats {
            mailboxes: state.mailboxes.len(),
            queued_messages,
            registry_size: state.registry.len(),
            subscriptions: state.handlers.values().map(Vec::len).sum(),
            sent_total: state.sent_total,
            delivered_total: state.delivered_total,
            evicted_total: state.evicted_total,
            expired_total: state.expired_total,
            handler_failures: state.handler_failures,
        }
    }
}
