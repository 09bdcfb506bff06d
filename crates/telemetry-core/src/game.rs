//! Catalogue of supported game titles and their static packet layouts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use simracing_telemetry_errors::SchemaError;
use tracing::debug;

use crate::schema::FieldSchema;

const FMS2023_DEFINITION: &str = include_str!("definitions/fms2023.yaml");

/// A game title emitting UDP telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Game {
    /// Forza Motorsport (2023), "Data Out" Dash format.
    #[serde(rename = "fms2023")]
    ForzaMotorsport2023,
}

impl Game {
    pub const ALL: &'static [Game] = &[Game::ForzaMotorsport2023];

    /// Short identifier used in file names and configuration.
    pub const fn id(self) -> &'static str {
        match self {
            Game::ForzaMotorsport2023 => "fms2023",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Game::ForzaMotorsport2023 => "Forza Motorsport",
        }
    }

    /// Port the game sends to unless told otherwise.
    pub const fn default_port(self) -> u16 {
        match self {
            Game::ForzaMotorsport2023 => 5300,
        }
    }

    /// Table receiving every accepted snapshot.
    pub const fn telemetry_table(self) -> &'static str {
        match self {
            Game::ForzaMotorsport2023 => "tmd_forzamotorsport2023",
        }
    }

    /// Table receiving deduplicated best-lap rows.
    pub const fn best_lap_table(self) -> &'static str {
        match self {
            Game::ForzaMotorsport2023 => "tmd_forzamotorsport2023_bestlaps",
        }
    }

    /// Embedded YAML definition of the packet layout.
    pub const fn schema_definition(self) -> &'static str {
        match self {
            Game::ForzaMotorsport2023 => FMS2023_DEFINITION,
        }
    }

    /// Parse the embedded definition. Call once at startup and share the
    /// result behind an `Arc`.
    pub fn load_schema(self) -> Result<FieldSchema, SchemaError> {
        let schema = FieldSchema::from_yaml(self.schema_definition())?;
        debug!(
            game = self.id(),
            fields = schema.len(),
            packet_len = schema.packet_len(),
            "loaded packet definition"
        );
        Ok(schema)
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Game {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Game::ALL
            .iter()
            .copied()
            .find(|game| game.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown game '{s}'"))
    }
}
