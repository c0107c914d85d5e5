//! In-process store
//!
//! Keeps nodes, pools and memberships in memory and enforces the same
//! referential rule as the appliance: a node referenced by a pool member
//! cannot be deleted. Every call is recorded so tests can assert on the exact
//! sequence of remote operations, and failures can be injected per operation.
//! The binary's `--offline` mode only reads the call log; fault injection and
//! pinning are for tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Node, Pool, StateStore};
use crate::error::{Error, Result};

/// Store operation kinds, used for fault injection and call filtering
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    CreateNode,
    GetNode,
    ModifyNode,
    DeleteNode,
    CreatePool,
    GetPool,
    ModifyPool,
    DeletePool,
    PoolMembers,
    AddPoolMember,
    DeletePoolMember,
}

/// A recorded store call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateNode { name: String, partition: String, address: String },
    GetNode { name: String, partition: String },
    ModifyNode { name: String, partition: String, node: Node },
    DeleteNode { name: String, partition: String },
    CreatePool { name: String, partition: String },
    GetPool { name: String, partition: String },
    ModifyPool { name: String, partition: String, pool: Pool },
    DeletePool { name: String, partition: String },
    PoolMembers { pool: String, partition: String },
    AddPoolMember { pool: String, partition: String, member: String },
    DeletePoolMember { pool: String, partition: String, member: String },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::CreateNode { .. } => Op::CreateNode,
            Call::GetNode { .. } => Op::GetNode,
            Call::ModifyNode { .. } => Op::ModifyNode,
            Call::DeleteNode { .. } => Op::DeleteNode,
            Call::CreatePool { .. } => Op::CreatePool,
            Call::GetPool { .. } => Op::GetPool,
            Call::ModifyPool { .. } => Op::ModifyPool,
            Call::DeletePool { .. } => Op::DeletePool,
            Call::PoolMembers { .. } => Op::PoolMembers,
            Call::AddPoolMember { .. } => Op::AddPoolMember,
            Call::DeletePoolMember { .. } => Op::DeletePoolMember,
        }
    }

    /// Resource name, or the member reference for membership calls
    fn target(&self) -> &str {
        match self {
            Call::CreateNode { name, .. }
            | Call::GetNode { name, .. }
            | Call::ModifyNode { name, .. }
            | Call::DeleteNode { name, .. }
            | Call::CreatePool { name, .. }
            | Call::GetPool { name, .. }
            | Call::ModifyPool { name, .. }
            | Call::DeletePool { name, .. } => name,
            Call::PoolMembers { pool, .. } => pool,
            Call::AddPoolMember { member, .. } | Call::DeletePoolMember { member, .. } => member,
        }
    }
}

#[derive(Debug)]
struct Fault {
    op: Op,
    target: Option<String>,
    status: u16,
    message: String,
}

#[derive(Debug, Default)]
struct PoolEntry {
    pool: Pool,
    members: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<(String, String), Node>,
    pools: BTreeMap<(String, String), PoolEntry>,
    calls: Vec<Call>,
    faults: Vec<Fault>,
    /// Memberships whose removal is acknowledged but never takes effect
    pinned: Vec<(String, String, String)>,
}

/// In-memory [`StateStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

fn key(name: &str, partition: &str) -> (String, String) {
    (partition.to_string(), name.to_string())
}

fn member_node(member: &str) -> &str {
    member.rsplit_once(':').map_or(member, |(node, _)| node)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a node without recording a call
    pub fn with_node(self, name: &str, partition: &str, address: &str) -> Self {
        self.state().nodes.insert(
            key(name, partition),
            Node {
                name: name.to_string(),
                partition: partition.to_string(),
                address: address.to_string(),
            },
        );
        self
    }

    /// Seed a pool and its members without recording calls
    pub fn with_pool(self, pool: Pool, members: &[&str]) -> Self {
        let entry = PoolEntry {
            members: members.iter().map(|m| m.to_string()).collect(),
            pool: pool.clone(),
        };
        self.state()
            .pools
            .insert(key(&pool.name, &pool.partition), entry);
        self
    }

    /// Test hook: make every matching call fail with the given status and
    /// message. `target` narrows the fault to one resource name or member
    /// reference.
    pub fn fail(&self, op: Op, target: Option<&str>, status: u16, message: &str) {
        self.state().faults.push(Fault {
            op,
            target: target.map(str::to_string),
            status,
            message: message.to_string(),
        });
    }

    /// Test hook: drop every injected fault
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Test hook: removing this membership reports success but leaves it in place
    pub fn pin_member(&self, pool: &str, partition: &str, member: &str) {
        self.state()
            .pinned
            .push((partition.to_string(), pool.to_string(), member.to_string()));
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    /// Test hook: forget the recorded calls
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn node(&self, name: &str, partition: &str) -> Option<Node> {
        self.state().nodes.get(&key(name, partition)).cloned()
    }

    pub fn pool(&self, name: &str, partition: &str) -> Option<Pool> {
        self.state()
            .pools
            .get(&key(name, partition))
            .map(|e| e.pool.clone())
    }

    pub fn members(&self, pool: &str, partition: &str) -> Vec<String> {
        self.state()
            .pools
            .get(&key(pool, partition))
            .map(|e| e.members.clone())
            .unwrap_or_default()
    }

    /// Record the call and return the injected fault for it, if any
    fn record(&self, call: Call) -> (MutexGuard<'_, State>, Result<()>) {
        let mut state = self.state();
        let fault = state
            .faults
            .iter()
            .find(|f| {
                f.op == call.op() && f.target.as_deref().map_or(true, |t| t == call.target())
            })
            .map(|f| Error::store(f.status, f.message.clone()));
        state.calls.push(call);
        match fault {
            Some(e) => (state, Err(e)),
            None => (state, Ok(())),
        }
    }
}

fn node_not_found(name: &str, partition: &str) -> Error {
    Error::store(
        404,
        format!("01020036:3: The requested Node (/{partition}/{name}) was not found."),
    )
}

fn pool_not_found(name: &str, partition: &str) -> Error {
    Error::store(
        404,
        format!("01020036:3: The requested Pool (/{partition}/{name}) was not found."),
    )
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn create_node(&self, name: &str, partition: &str, address: &str) -> Result<()> {
        let (mut state, injected) = self.record(Call::CreateNode {
            name: name.to_string(),
            partition: partition.to_string(),
            address: address.to_string(),
        });
        injected?;
        let k = key(name, partition);
        if state.nodes.contains_key(&k) {
            return Err(Error::store(
                409,
                format!("01020066:3: The requested Node (/{partition}/{name}) already exists in partition {partition}."),
            ));
        }
        state.nodes.insert(
            k,
            Node {
                name: name.to_string(),
                partition: partition.to_string(),
                address: address.to_string(),
            },
        );
        Ok(())
    }

    async fn get_node(&self, name: &str, partition: &str) -> Result<Option<Node>> {
        let (state, injected) = self.record(Call::GetNode {
            name: name.to_string(),
            partition: partition.to_string(),
        });
        injected?;
        Ok(state.nodes.get(&key(name, partition)).cloned())
    }

    async fn modify_node(&self, name: &str, partition: &str, node: &Node) -> Result<()> {
        let (state, injected) = self.record(Call::ModifyNode {
            name: name.to_string(),
            partition: partition.to_string(),
            node: node.clone(),
        });
        injected?;
        let existing = state
            .nodes
            .get(&key(name, partition))
            .ok_or_else(|| node_not_found(name, partition))?;
        if existing.address != node.address {
            return Err(Error::store(
                400,
                format!("01070734:3: Configuration error: Cannot modify the address of node /{partition}/{name}"),
            ));
        }
        Ok(())
    }

    async fn delete_node(&self, name: &str, partition: &str) -> Result<()> {
        let (mut state, injected) = self.record(Call::DeleteNode {
            name: name.to_string(),
            partition: partition.to_string(),
        });
        injected?;
        let k = key(name, partition);
        if !state.nodes.contains_key(&k) {
            return Err(node_not_found(name, partition));
        }
        let blocking = state.pools.iter().find(|((p, _), entry)| {
            p == partition && entry.members.iter().any(|m| member_node(m) == name)
        });
        if let Some(((_, pool), _)) = blocking {
            return Err(Error::store(
                400,
                format!("01070110:3: Node address '/{partition}/{name}' is referenced by a member of pool '/{partition}/{pool}'."),
            ));
        }
        state.nodes.remove(&k);
        Ok(())
    }

    async fn create_pool(&self, name: &str, partition: &str) -> Result<()> {
        let (mut state, injected) = self.record(Call::CreatePool {
            name: name.to_string(),
            partition: partition.to_string(),
        });
        injected?;
        let k = key(name, partition);
        if state.pools.contains_key(&k) {
            return Err(Error::store(
                409,
                format!("01020066:3: The requested Pool (/{partition}/{name}) already exists in partition {partition}."),
            ));
        }
        let pool = Pool {
            name: name.to_string(),
            partition: partition.to_string(),
            allow_nat: true,
            allow_snat: true,
            load_balancing_mode: "round-robin".to_string(),
            monitor: String::new(),
        };
        state.pools.insert(
            k,
            PoolEntry {
                pool,
                members: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_pool(&self, name: &str, partition: &str) -> Result<Option<Pool>> {
        let (state, injected) = self.record(Call::GetPool {
            name: name.to_string(),
            partition: partition.to_string(),
        });
        injected?;
        Ok(state
            .pools
            .get(&key(name, partition))
            .map(|e| e.pool.clone()))
    }

    async fn modify_pool(&self, name: &str, partition: &str, pool: &Pool) -> Result<()> {
        let (mut state, injected) = self.record(Call::ModifyPool {
            name: name.to_string(),
            partition: partition.to_string(),
            pool: pool.clone(),
        });
        injected?;
        let entry = state
            .pools
            .get_mut(&key(name, partition))
            .ok_or_else(|| pool_not_found(name, partition))?;
        entry.pool = Pool {
            name: name.to_string(),
            partition: partition.to_string(),
            ..pool.clone()
        };
        Ok(())
    }

    async fn delete_pool(&self, name: &str, partition: &str) -> Result<()> {
        let (mut state, injected) = self.record(Call::DeletePool {
            name: name.to_string(),
            partition: partition.to_string(),
        });
        injected?;
        state
            .pools
            .remove(&key(name, partition))
            .map(|_| ())
            .ok_or_else(|| pool_not_found(name, partition))
    }

    async fn pool_members(&self, pool: &str, partition: &str) -> Result<Vec<String>> {
        let (state, injected) = self.record(Call::PoolMembers {
            pool: pool.to_string(),
            partition: partition.to_string(),
        });
        injected?;
        state
            .pools
            .get(&key(pool, partition))
            .map(|e| e.members.clone())
            .ok_or_else(|| pool_not_found(pool, partition))
    }

    async fn add_pool_member(&self, pool: &str, partition: &str, member: &str) -> Result<()> {
        let (mut state, injected) = self.record(Call::AddPoolMember {
            pool: pool.to_string(),
            partition: partition.to_string(),
            member: member.to_string(),
        });
        injected?;
        let node = member_node(member);
        if !state.nodes.contains_key(&key(node, partition)) {
            return Err(Error::store(
                400,
                format!("01070734:3: Configuration error: Node /{partition}/{node} referenced by pool member {member} does not exist"),
            ));
        }
        let entry = state
            .pools
            .get_mut(&key(pool, partition))
            .ok_or_else(|| pool_not_found(pool, partition))?;
        if entry.members.iter().any(|m| m == member) {
            return Err(Error::store(
                409,
                format!("01020066:3: The requested Pool Member (/{partition}/{pool} /{partition}/{member}) already exists."),
            ));
        }
        entry.members.push(member.to_string());
        Ok(())
    }

    async fn delete_pool_member(&self, pool: &str, partition: &str, member: &str) -> Result<()> {
        let (mut state, injected) = self.record(Call::DeletePoolMember {
            pool: pool.to_string(),
            partition: partition.to_string(),
            member: member.to_string(),
        });
        injected?;
        let pinned = state
            .pinned
            .iter()
            .any(|(pa, po, m)| pa == partition && po == pool && m == member);
        let entry = state
            .pools
            .get_mut(&key(pool, partition))
            .ok_or_else(|| pool_not_found(pool, partition))?;
        let Some(index) = entry.members.iter().position(|m| m == member) else {
            return Err(Error::store(
                404,
                format!("01020036:3: The requested Pool Member (/{partition}/{pool} /{partition}/{member}) was not found."),
            ));
        };
        if !pinned {
            entry.members.remove(index);
        }
        Ok(())
    }
}
