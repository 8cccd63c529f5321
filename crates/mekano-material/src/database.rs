//! Material database with solid presets.
//!
//! Values are representative engineering constants for soft materials
//! that are stable at the default timestep.

use std::collections::HashMap;

use crate::model::MaterialModel;
use crate::properties::SolidProperties;

/// A named collection of solid material presets.
///
/// Materials are looked up by name (e.g., "rubber", "soft_tissue").
/// Custom materials can be registered at runtime.
#[derive(Debug, Clone)]
pub struct MaterialDatabase {
    materials: HashMap<String, SolidProperties>,
}

impl MaterialDatabase {
    /// Creates a new database with the 5 built-in presets.
    pub fn with_defaults() -> Self {
        let mut db = Self::empty();

        db.register(rubber());
        db.register(soft_tissue());
        db.register(foam());
        db.register(gelatin());
        db.register(stiff_polymer());

        db
    }

    /// Creates an empty database.
    pub fn empty() -> Self {
        Self {
            materials: HashMap::new(),
        }
    }

    /// Registers a material. Overwrites if the name already exists.
    pub fn register(&mut self, props: SolidProperties) {
        self.materials.insert(props.name.clone(), props);
    }

    /// Looks up a material by name. Returns `None` if not found.
    pub fn get(&self, name: &str) -> Option<&SolidProperties> {
        self.materials.get(name)
    }

    /// Returns all registered material names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.materials.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered materials.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialDatabase {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ─── Built-in Presets ─────────────────────────────────────────────────

/// Natural rubber. Nearly incompressible, large elastic range.
fn rubber() -> SolidProperties {
    SolidProperties {
        name: "rubber".into(),
        density: 1100.0,
        youngs_modulus: 1.0e5,
        poisson_ratio: 0.45,
        model: MaterialModel::NeoHookean,
        damping: 0.0,
    }
}

/// Soft tissue. Very compliant, slightly damped.
fn soft_tissue() -> SolidProperties {
    SolidProperties {
        name: "soft_tissue".into(),
        density: 1000.0,
        youngs_modulus: 1.0e4,
        poisson_ratio: 0.40,
        model: MaterialModel::NeoHookean,
        damping: 0.5,
    }
}

/// Open-cell foam. Light and compressible.
fn foam() -> SolidProperties {
    SolidProperties {
        name: "foam".into(),
        density: 100.0,
        youngs_modulus: 5.0e3,
        poisson_ratio: 0.25,
        model: MaterialModel::CoRotated,
        damping: 1.0,
    }
}

/// Gelatin. Jiggly, nearly incompressible.
fn gelatin() -> SolidProperties {
    SolidProperties {
        name: "gelatin".into(),
        density: 1050.0,
        youngs_modulus: 2.0e3,
        poisson_ratio: 0.45,
        model: MaterialModel::Stvk,
        damping: 0.1,
    }
}

/// Stiff polymer. Small strains only.
fn stiff_polymer() -> SolidProperties {
    SolidProperties {
        name: "stiff_polymer".into(),
        density: 1200.0,
        youngs_modulus: 1.0e6,
        poisson_ratio: 0.35,
        model: MaterialModel::Linear,
        damping: 0.0,
    }
}
