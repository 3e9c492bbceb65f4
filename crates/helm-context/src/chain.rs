//! Context chains: ordered groupings of related items.
//!
//! A chain is itself a context item of type `context_chain` whose data is a
//! serialized `ContextChain`. Members whose data is a JSON object also get a
//! `chains` back-reference `{chain_id, position}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use helm_contracts::{
    context::{ChainLink, ChainMember, ContextChain, ContextItem},
    error::{HelmError, HelmResult},
};

use crate::store::ContextStore;

pub const CHAIN_ITEM_TYPE: &str = "context_chain";

/// A chain with its members resolved, in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainView {
    pub chain: ContextChain,
    pub members: Vec<ChainMember>,
}

fn add_back_reference(item: &mut ContextItem, chain_id: &str, position: usize) {
    if let Value::Object(data) = &mut item.data {
        let refs = data.entry("chains").or_insert_with(|| json!([]));
        if let Value::Array(refs) = refs {
            refs.push(json!({ "chain_id": chain_id, "position": position }));
        }
    }
}

impl ContextStore {
    fn chain_item(
        &self,
        chain_id: &str,
        session_id: Option<&str>,
    ) -> HelmResult<(ContextItem, ContextChain)> {
        let item = self
            .get_context_item(chain_id, session_id)?
            .filter(|item| item.item_type == CHAIN_ITEM_TYPE)
            .ok_or_else(|| HelmError::Context {
                reason: format!("chain '{chain_id}' not found"),
            })?;
        let chain: ContextChain =
            serde_json::from_value(item.data.clone()).map_err(|e| HelmError::Context {
                reason: format!("chain '{chain_id}' is malformed: {e}"),
            })?;
        Ok((item, chain))
    }

    fn member_item(&self, item_id: &str, session_id: Option<&str>) -> HelmResult<ContextItem> {
        self.get_context_item(item_id, session_id)?
            .ok_or_else(|| HelmError::Context {
                reason: format!("context item '{item_id}' not found"),
            })
    }

    /// Start a chain rooted at an existing item. The chain item inherits the
    /// root's TTL. Returns the chain id.
    pub fn create_chain(
        &self,
        root_item_id: &str,
        name: &str,
        description: &str,
        session_id: Option<&str>,
    ) -> HelmResult<String> {
        self.create_chain_at(root_item_id, name, description, session_id, Utc::now())
    }

    pub fn create_chain_at(
        &self,
        root_item_id: &str,
        name: &str,
        description: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<String> {
        let mut root = self.member_item(root_item_id, session_id)?;

        let chain = ContextChain {
            chain_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            root_item_id: root_item_id.to_string(),
            created_at: now,
            updated_at: now,
            items: vec![ChainLink {
                item_id: root_item_id.to_string(),
                position: 0,
                added_at: now,
            }],
        };
        let chain_id = chain.chain_id.clone();
        let data = serde_json::to_value(&chain).map_err(|e| HelmError::Context {
            reason: format!("chain '{chain_id}' could not be serialized: {e}"),
        })?;

        let mut item = ContextItem {
            id: chain_id.clone(),
            item_type: CHAIN_ITEM_TYPE.to_string(),
            data,
            priority: 0,
            ttl_secs: root.ttl_secs,
            created_at: now,
            updated_at: now,
            session_id: session_id.map(str::to_string),
            agent_id: None,
            is_expired: false,
            interaction_count: 0,
            relevance_score: 0.0,
        };
        item.priority = self.prioritizer().priority(&item, now);
        self.save(item)?;

        add_back_reference(&mut root, &chain_id, 0);
        self.save(root)?;

        info!(chain_id = %chain_id, name, root_item_id, "context chain created");
        Ok(chain_id)
    }

    /// Append an item at the end of a chain. Returns its position.
    pub fn add_to_chain(
        &self,
        chain_id: &str,
        item_id: &str,
        session_id: Option<&str>,
    ) -> HelmResult<usize> {
        self.add_to_chain_at(chain_id, item_id, session_id, Utc::now())
    }

    pub fn add_to_chain_at(
        &self,
        chain_id: &str,
        item_id: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<usize> {
        let (mut chain_item, mut chain) = self.chain_item(chain_id, session_id)?;
        let mut member = self.member_item(item_id, session_id)?;

        let position = chain.items.len();
        chain.items.push(ChainLink {
            item_id: item_id.to_string(),
            position,
            added_at: now,
        });
        chain.updated_at = now;

        chain_item.data = serde_json::to_value(&chain).map_err(|e| HelmError::Context {
            reason: format!("chain '{chain_id}' could not be serialized: {e}"),
        })?;
        chain_item.updated_at = now;
        chain_item.priority = self.prioritizer().priority(&chain_item, now);
        self.save(chain_item)?;

        add_back_reference(&mut member, chain_id, position);
        self.save(member)?;

        debug!(chain_id, item_id, position, "item added to context chain");
        Ok(position)
    }

    /// The chain and its members in position order. Members that no longer
    /// exist are skipped.
    pub fn get_chain(&self, chain_id: &str, session_id: Option<&str>) -> HelmResult<ChainView> {
        let (_, chain) = self.chain_item(chain_id, session_id)?;

        let mut links = chain.items.clone();
        links.sort_by_key(|link| link.position);

        let mut members = Vec::with_capacity(links.len());
        for link in links {
            match self.get_context_item(&link.item_id, session_id)? {
                Some(item) => members.push(ChainMember {
                    position: link.position,
                    item_id: item.id,
                    item_type: item.item_type,
                    data: item.data,
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                }),
                None => debug!(chain_id, item_id = %link.item_id, "chain member missing, skipped"),
            }
        }
        Ok(ChainView { chain, members })
    }
}
