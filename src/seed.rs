use serde::Serialize;
use tracing::{info, warn};

use crate::color::normalize_hex;
use crate::config::{PaletteFile, WikiMetadata};
use crate::error::{BuildError, ConfigError};
use crate::store::Store;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SeedStats {
    pub ref_types_created: usize,
    pub ref_types_existing: usize,
    pub aliases_created: usize,
    pub aliases_existing: usize,
    /// Aliases already bound to a different type; left as they were.
    pub alias_conflicts: usize,
    pub colors_created: usize,
    pub colors_existing: usize,
}

/// Populate reference types and aliases from wiki metadata.
///
/// Blank names are configuration errors and are reported before anything is
/// written.
pub fn seed_wiki(store: &Store, meta: &WikiMetadata) -> Result<SeedStats, BuildError> {
    for (category, entries) in meta.sections() {
        for (name, entry) in entries {
            if name.trim().is_empty() || entry.aliases.iter().any(|a| a.trim().is_empty()) {
                return Err(ConfigError::BlankName(category).into());
            }
        }
    }

    let mut stats = SeedStats::default();
    for (category, entries) in meta.sections() {
        for (name, entry) in entries {
            let rt = store.get_or_create_ref_type(name, category)?;
            if rt.is_created() {
                stats.ref_types_created += 1;
                info!(
                    kind = "created",
                    name = %name,
                    %category,
                    first_appearance = ?entry.first_appearance,
                    attributes = entry.attributes.len(),
                    "reference type"
                );
            } else {
                stats.ref_types_existing += 1;
            }
            let rt = rt.into_inner();

            for alias in &entry.aliases {
                if alias == name {
                    continue;
                }
                let a = store.get_or_create_alias(alias, rt.id)?;
                if a.is_created() {
                    stats.aliases_created += 1;
                    info!(kind = "created", alias = %alias, target = %name, "alias");
                } else if a.get().ref_type_id != rt.id {
                    stats.alias_conflicts += 1;
                    warn!(
                        kind = "exists",
                        alias = %alias,
                        target = %name,
                        bound_to = a.get().ref_type_id,
                        "alias already bound elsewhere"
                    );
                } else {
                    stats.aliases_existing += 1;
                }
            }
        }
    }
    Ok(stats)
}

/// Reject palette entries whose hex code cannot be normalized.
pub fn validate_palette(palette: &PaletteFile) -> Result<(), ConfigError> {
    for cat in &palette.categories {
        for color in &cat.colors {
            if normalize_hex(&color.hex).is_none() {
                return Err(ConfigError::ColorHex {
                    category: cat.name.clone(),
                    hex: color.hex.clone(),
                });
            }
        }
    }
    Ok(())
}

pub fn seed_palette(store: &Store, palette: &PaletteFile) -> Result<SeedStats, BuildError> {
    validate_palette(palette)?;

    let mut stats = SeedStats::default();
    for cat in &palette.categories {
        let category = store.get_or_create_color_category(&cat.name)?.into_inner();
        for color in &cat.colors {
            let Some(hex) = normalize_hex(&color.hex) else {
                continue;
            };
            if store.get_or_create_color(&color.name, &hex, category.id)?.is_created() {
                stats.colors_created += 1;
                info!(kind = "created", color = %color.name, %hex, category = %cat.name, "color");
            } else {
                stats.colors_existing += 1;
            }
        }
    }
    Ok(stats)
}
