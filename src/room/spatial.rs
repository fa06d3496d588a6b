use std::f64::consts::PI;

use crate::{
    configs::{RoomConfig, SpatialConfig},
    protocol::{Position, SpatialEffect},
};

/// Ticks for one full aisle sweep (there and back) at speed 1.
const AISLE_SWEEP_TICKS: f64 = 100.0;

/// Distance-based gain: `clamp(max · e^(−falloff · d), min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainModel {
    pub max_gain: f64,
    pub min_gain: f64,
    pub falloff: f64,
}

impl GainModel {
    pub fn from_config(config: &SpatialConfig) -> Self {
        Self {
            max_gain: config.max_gain,
            min_gain: config.min_gain,
            falloff: config.falloff,
        }
    }

    pub fn gain(&self, client: &Position, source: &Position) -> f64 {
        self.gain_at(client.distance(source))
    }

    pub fn gain_at(&self, distance: f64) -> f64 {
        let raw = self.max_gain * (-self.falloff * distance.max(0.0)).exp();
        raw.min(self.max_gain).max(self.min_gain)
    }
}

impl Default for GainModel {
    fn default() -> Self {
        Self::from_config(&SpatialConfig::default())
    }
}

/// Geometry of the shared coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub size: f64,
    pub client_radius: f64,
}

impl Grid {
    pub fn from_config(config: &RoomConfig) -> Self {
        Self {
            size: config.grid_size,
            client_radius: config.client_radius,
        }
    }

    pub fn center(&self) -> Position {
        Position::new(self.size / 2.0, self.size / 2.0)
    }

    pub fn clamp(&self, position: Position) -> Position {
        Position::new(
            position.x.clamp(0.0, self.size),
            position.y.clamp(0.0, self.size),
        )
    }

    /// Evenly spaced points on the client circle, starting at the top and
    /// going clockwise. A lone client sits in the center.
    pub fn circle_layout(&self, count: usize) -> Vec<Position> {
        let center = self.center();
        if count == 1 {
            return vec![center];
        }
        (0..count)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / count as f64 - PI / 2.0;
                Position::new(
                    center.x + self.client_radius * angle.cos(),
                    center.y + self.client_radius * angle.sin(),
                )
            })
            .collect()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::from_config(&RoomConfig::default())
    }
}

/// Listening-source position after `counter` ticks of `effect`.
pub fn path_position(effect: SpatialEffect, counter: u64, speed: f64, grid: &Grid) -> Position {
    let center = grid.center();
    let n = counter as f64;
    match effect {
        SpatialEffect::Rotation => {
            let angle = n * PI * speed / 30.0;
            Position::new(
                center.x + grid.client_radius * angle.cos(),
                center.y + grid.client_radius * angle.sin(),
            )
        }
        SpatialEffect::Infinity => {
            let theta = n * PI * speed / 60.0;
            let width = grid.size * 0.4;
            let height = grid.size * 0.2;
            Position::new(
                center.x + width * theta.sin(),
                center.y + height * (2.0 * theta).sin(),
            )
        }
        SpatialEffect::AisleSweep => {
            let phase = (n * speed / AISLE_SWEEP_TICKS).rem_euclid(1.0);
            Position::new(grid.size * (1.0 - (2.0 * phase - 1.0).abs()), center.y)
        }
    }
}
