use std::collections::{HashMap, HashSet};

use reference_types::{Alias, RefCategory, RefType};

use crate::store::{Result, Store};

/// Identity state grown during a run: every reference type and alias known
/// so far, indexed for the lookups the resolution stages make.
///
/// Owned by the build orchestrator and updated immediately after each create
/// in the store, so later candidates in the same run see earlier decisions.
/// Lookups and creates are check-then-act; the context must not be shared
/// across threads.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    types: HashMap<i64, RefType>,
    by_name: HashMap<String, Vec<i64>>,
    aliases: HashMap<String, i64>,
    /// Lowercased character names and character aliases
    character_names: HashSet<String>,
}

impl ResolutionContext {
    pub fn load(store: &Store) -> Result<Self> {
        let mut ctx = ResolutionContext::default();
        for rt in store.all_ref_types()? {
            ctx.add_type(rt);
        }
        for alias in store.all_aliases()? {
            ctx.add_alias(&alias);
        }
        Ok(ctx)
    }

    pub fn add_type(&mut self, rt: RefType) {
        if rt.category == RefCategory::Character {
            self.character_names.insert(rt.name.to_lowercase());
        }
        let ids = self.by_name.entry(rt.name.clone()).or_default();
        if !ids.contains(&rt.id) {
            ids.push(rt.id);
        }
        self.types.insert(rt.id, rt);
    }

    pub fn add_alias(&mut self, alias: &Alias) {
        if self
            .types
            .get(&alias.ref_type_id)
            .is_some_and(|rt| rt.category == RefCategory::Character)
        {
            self.character_names.insert(alias.name.to_lowercase());
        }
        self.aliases.insert(alias.name.clone(), alias.ref_type_id);
    }

    /// Types whose canonical name is exactly `name`, in creation order.
    pub fn types_named(&self, name: &str) -> Vec<&RefType> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.types.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn alias_target(&self, name: &str) -> Option<&RefType> {
        self.aliases.get(name).and_then(|id| self.types.get(id))
    }

    /// Case-insensitive test against character names and their aliases.
    pub fn is_character_name(&self, name: &str) -> bool {
        self.character_names.contains(&name.to_lowercase())
    }

    /// Canonical names plus aliases of every type in `category`.
    pub fn names_in(&self, category: RefCategory) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .types
            .values()
            .filter(|rt| rt.category == category)
            .map(|rt| rt.name.as_str())
            .collect();
        names.extend(
            self.aliases
                .iter()
                .filter(|(_, id)| self.types.get(id).is_some_and(|rt| rt.category == category))
                .map(|(name, _)| name.as_str()),
        );
        names.sort_unstable();
        names
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}
