//! Ability upgrade trees and their persisted state.
//!
//! The tree structure itself is content and arrives as JSON from the host;
//! the core only enforces purchase rules and accumulates effect scalars in
//! Q16.16 for the gameplay layer. Persisted state is the versioned document
//! described in the save schema (`schemaVersion: 1`).

use std::collections::{BTreeMap, HashMap};

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::fixed::Fixed;

/// Persisted progression document, `schemaVersion: 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionState {
    pub schema_version: u32,
    pub class_id: String,
    pub essence: i32,
    /// external node id -> purchased level
    pub nodes: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectDef {
    #[serde(default, rename = "type")]
    _kind: String,
    key: String,
    per_level: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDef {
    id: String,
    #[serde(default)]
    title: String,
    cost: i32,
    max_level: u32,
    #[serde(default)]
    requires: Vec<String>,
    effect: EffectDef,
    #[serde(default)]
    tier: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct TreeDef {
    nodes: Vec<NodeDef>,
}

/// Why a purchase was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseError {
    UnknownNode,
    MaxLevel,
    MissingRequirement,
    InsufficientEssence,
}

/// One upgrade node after resolution: requirements are numeric indices and
/// the per-level effect is already fixed-point.
#[derive(Debug, Clone)]
struct UpgradeNode {
    external_id: String,
    #[allow(dead_code)]
    title: String,
    cost: i32,
    max_level: u32,
    requires: Vec<usize>,
    effect_key: String,
    per_level_fix: Fixed,
    #[allow(dead_code)]
    tier: i32,
}

/// A class's upgrade tree plus purchase state.
#[derive(Debug, Clone, Default)]
pub struct UpgradeTree {
    class_id: String,
    nodes: Vec<UpgradeNode>,
    levels: Vec<u32>,
    essence: i32,
    external_to_numeric: HashMap<String, usize>,
}

impl UpgradeTree {
    pub fn from_json(class_id: &str, json: &str) -> Result<Self, serde_json::Error> {
        let def: TreeDef = serde_json::from_str(json)?;

        let external_to_numeric: HashMap<String, usize> = def
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let nodes = def
            .nodes
            .iter()
            .map(|n| UpgradeNode {
                external_id: n.id.clone(),
                title: n.title.clone(),
                cost: n.cost,
                max_level: n.max_level,
                // Unknown requirement ids are dropped rather than trapping
                requires: n
                    .requires
                    .iter()
                    .filter_map(|r| external_to_numeric.get(r).copied())
                    .collect(),
                effect_key: n.effect.key.clone(),
                per_level_fix: Fixed::from_float(n.effect.per_level as f32),
                tier: n.tier,
            })
            .collect::<Vec<_>>();

        let levels = vec![0; nodes.len()];

        Ok(Self {
            class_id: class_id.to_string(),
            nodes,
            levels,
            essence: 0,
            external_to_numeric,
        })
    }

    pub fn can_purchase(&self, node: usize) -> Result<(), PurchaseError> {
        let Some(def) = self.nodes.get(node) else {
            return Err(PurchaseError::UnknownNode);
        };
        if self.levels[node] >= def.max_level {
            return Err(PurchaseError::MaxLevel);
        }
        for &req in &def.requires {
            if self.levels.get(req).copied().unwrap_or(0) == 0 {
                return Err(PurchaseError::MissingRequirement);
            }
        }
        if self.essence < def.cost {
            return Err(PurchaseError::InsufficientEssence);
        }
        Ok(())
    }

    pub fn purchase(&mut self, node: usize) -> bool {
        if self.can_purchase(node).is_err() {
            return false;
        }
        self.essence -= self.nodes[node].cost;
        self.levels[node] += 1;
        true
    }

    pub fn purchase_by_external_id(&mut self, external_id: &str) -> bool {
        match self.external_to_numeric.get(external_id).copied() {
            Some(node) => self.purchase(node),
            None => false,
        }
    }

    pub fn add_essence(&mut self, amount: i32) {
        self.essence = (self.essence + amount).max(0);
    }

    pub fn essence(&self) -> i32 {
        self.essence
    }

    pub fn level_of(&self, external_id: &str) -> u32 {
        self.external_to_numeric
            .get(external_id)
            .and_then(|&i| self.levels.get(i).copied())
            .unwrap_or(0)
    }

    /// Sum of per-level contributions for an effect key, accumulated in
    /// Q16.16 with saturation at the i32 extremes.
    pub fn effect_scalar_fixed(&self, key: &str) -> Fixed {
        let mut accum: i64 = 0;
        for (node, &level) in self.nodes.iter().zip(&self.levels) {
            if level == 0 || node.effect_key != key {
                continue;
            }
            accum += node.per_level_fix.raw as i64 * level as i64;
        }
        Fixed::from_raw(accum.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    pub fn state(&self) -> ProgressionState {
        ProgressionState {
            schema_version: 1,
            class_id: self.class_id.clone(),
            essence: self.essence,
            nodes: self
                .nodes
                .iter()
                .zip(&self.levels)
                .filter(|(_, &level)| level > 0)
                .map(|(node, &level)| (node.external_id.clone(), level))
                .collect(),
        }
    }

    pub fn apply_state(&mut self, state: &ProgressionState) {
        self.essence = state.essence.max(0);
        for level in &mut self.levels {
            *level = 0;
        }
        for (external_id, &level) in &state.nodes {
            if let Some(&i) = self.external_to_numeric.get(external_id) {
                self.levels[i] = level.min(self.nodes[i].max_level);
            }
        }
    }
}

/// All loaded trees, keyed by class id.
#[derive(Resource, Debug, Default)]
pub struct Progression {
    trees: BTreeMap<String, UpgradeTree>,
}

impl Progression {
    /// Load or replace a class's tree definition. Purchase state resets.
    pub fn set_tree(&mut self, class_id: &str, json: &str) -> bool {
        match UpgradeTree::from_json(class_id, json) {
            Ok(tree) => {
                self.trees.insert(class_id.to_string(), tree);
                true
            }
            Err(_) => false,
        }
    }

    /// Apply a persisted state document to its class's tree. Unknown schema
    /// versions and unloaded classes are no-ops.
    pub fn set_state(&mut self, json: &str) -> bool {
        let Ok(state) = serde_json::from_str::<ProgressionState>(json) else {
            return false;
        };
        if state.schema_version != 1 {
            return false;
        }
        match self.trees.get_mut(&state.class_id) {
            Some(tree) => {
                tree.apply_state(&state);
                true
            }
            None => false,
        }
    }

    /// Re-emit the persisted document for a class.
    pub fn get_state(&self, class_id: &str) -> Option<String> {
        self.trees
            .get(class_id)
            .and_then(|tree| serde_json::to_string(&tree.state()).ok())
    }

    pub fn purchase(&mut self, class_id: &str, external_id: &str) -> bool {
        match self.trees.get_mut(class_id) {
            Some(tree) => tree.purchase_by_external_id(external_id),
            None => false,
        }
    }

    pub fn add_essence(&mut self, class_id: &str, amount: i32) {
        if let Some(tree) = self.trees.get_mut(class_id) {
            tree.add_essence(amount);
        }
    }

    pub fn effect_scalar_fixed(&self, class_id: &str, key: &str) -> Fixed {
        self.trees
            .get(class_id)
            .map(|tree| tree.effect_scalar_fixed(key))
            .unwrap_or(Fixed::ZERO)
    }

    pub fn tree(&self, class_id: &str) -> Option<&UpgradeTree> {
        self.trees.get(class_id)
    }
}
