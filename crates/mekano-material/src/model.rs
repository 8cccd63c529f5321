//! Material model tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use mekano_types::MekanoError;

use crate::corotational::CoRotatedModel;
use crate::linear::LinearModel;
use crate::neo_hookean::NeoHookeanModel;
use crate::stvk::StvkModel;
use crate::traits::ConstitutiveModel;

static LINEAR: LinearModel = LinearModel;
static NEO_HOOKEAN: NeoHookeanModel = NeoHookeanModel;
static STVK: StvkModel = StvkModel;
static CO_ROTATED: CoRotatedModel = CoRotatedModel;

/// Closed set of constitutive models an element can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialModel {
    Linear,
    #[default]
    NeoHookean,
    Stvk,
    CoRotated,
}

impl MaterialModel {
    /// All models, in declaration order.
    pub const ALL: [MaterialModel; 4] = [
        MaterialModel::Linear,
        MaterialModel::NeoHookean,
        MaterialModel::Stvk,
        MaterialModel::CoRotated,
    ];

    /// Returns the shared implementation of this model.
    pub fn constitutive(self) -> &'static dyn ConstitutiveModel {
        match self {
            MaterialModel::Linear => &LINEAR,
            MaterialModel::NeoHookean => &NEO_HOOKEAN,
            MaterialModel::Stvk => &STVK,
            MaterialModel::CoRotated => &CO_ROTATED,
        }
    }
}

impl fmt::Display for MaterialModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constitutive().name())
    }
}

impl FromStr for MaterialModel {
    type Err = MekanoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(MaterialModel::Linear),
            "neo_hookean" | "neohookean" => Ok(MaterialModel::NeoHookean),
            "stvk" | "st_venant_kirchhoff" => Ok(MaterialModel::Stvk),
            "co_rotated" | "corotated" | "co_rotational" => Ok(MaterialModel::CoRotated),
            other => Err(MekanoError::InvalidMaterial(format!(
                "unknown material model '{other}'"
            ))),
        }
    }
}
