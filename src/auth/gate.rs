//! Authorization Gate. Decides whether an acting delegate may
//! reference an arbitrary node by key (a `{link: key}` rewrite entry, or a
//! `cp` of an external subtree).

use crate::codec::{empty_dnode_key, NodeKey};
use crate::common::error::CoreError;
use crate::delegate::Delegate;
use crate::depot::DepotRegistry;
use crate::ownership::OwnershipIndex;
use crate::tree::NodeStoreHandle;

use super::proof::{verify_word, ProofMap};

/// Strict-order authorization check for a link reference:
/// 1. well-known node → allow
/// 2. full-chain ownership (root first) → allow
/// 3. root delegate → allow (priority short-circuit)
/// 4. a syntactically valid proof for this target, if the delegate has a
///    scope → allow if it verifies
/// 5. otherwise → `LINK_NOT_AUTHORIZED`
pub async fn authorize_link(
    store: &NodeStoreHandle,
    ownership: &OwnershipIndex,
    depots: &DepotRegistry,
    delegate: &Delegate,
    target: NodeKey,
    proof: &ProofMap,
) -> Result<(), CoreError> {
    if target == empty_dnode_key() {
        return Ok(());
    }

    for id in &delegate.chain {
        if ownership.has_ownership(&target, id).await? {
            return Ok(());
        }
    }

    if delegate.is_root() {
        return Ok(());
    }

    if delegate.scope.is_some() {
        let hex = super::proof::node_hash_hex(&target);
        if let Some(word) = proof.get(&hex) {
            if verify_word(store, depots, delegate, target, word).await.is_ok() {
                return Ok(());
            }
        }
    }

    Err(CoreError::authorization("LINK_NOT_AUTHORIZED", format!("delegate is not authorized to reference {target}")))
}
