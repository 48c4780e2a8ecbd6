//! Random background traffic for the simulated adapter

use busdiag_core::{BusFrame, CanId, Dialect, Direction, Frame, LinFrame, ProtectedId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;

/// Highest LIN frame id used for signal traffic (0x3C.. are diagnostic)
const MAX_LIN_SIGNAL_ID: u8 = 0x3B;

/// Generates random frames: id from the configured range, 1..=8 bytes, random direction
///
/// The diagnostic response id is never used, so random traffic cannot be
/// mistaken for an ECU answer.
pub struct TrafficGenerator {
    rng: StdRng,
    id_min: u32,
    id_max: u32,
    avoid_id: u32,
    max_payload: usize,
    dialect: Dialect,
}

impl TrafficGenerator {
    pub fn new(config: &SimulationConfig, avoid_id: u32, dialect: Dialect, max_payload: usize) -> Self {
        Self::with_rng(StdRng::from_entropy(), config, avoid_id, dialect, max_payload)
    }

    pub fn seeded(
        seed: u64,
        config: &SimulationConfig,
        avoid_id: u32,
        dialect: Dialect,
        max_payload: usize,
    ) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), config, avoid_id, dialect, max_payload)
    }

    fn with_rng(
        rng: StdRng,
        config: &SimulationConfig,
        avoid_id: u32,
        dialect: Dialect,
        max_payload: usize,
    ) -> Self {
        Self {
            rng,
            id_min: config.id_min.min(config.id_max),
            id_max: config.id_max.max(config.id_min),
            avoid_id,
            max_payload: max_payload.clamp(1, busdiag_core::MAX_CLASSIC_PAYLOAD),
            dialect,
        }
    }

    /// Next random frame; `None` when the id range holds nothing but the avoided id
    pub fn next_frame(&mut self) -> Option<BusFrame> {
        let len = self.rng.gen_range(1..=self.max_payload);
        let mut data = vec![0u8; len];
        self.rng.fill(data.as_mut_slice());
        let direction = if self.rng.gen::<bool>() {
            Direction::Rx
        } else {
            Direction::Tx
        };

        if self.dialect == Dialect::Lin {
            let frame_id = self.rng.gen_range(0..=MAX_LIN_SIGNAL_ID);
            let pid = ProtectedId::from_frame_id(frame_id).ok()?;
            return LinFrame::with_computed_checksum(pid, data, Default::default(), direction)
                .ok()
                .map(BusFrame::Lin);
        }

        let raw = self.pick_id()?;
        let id = CanId::standard(raw).ok()?;
        Frame::new(id, data, direction).ok().map(BusFrame::Can)
    }

    fn pick_id(&mut self) -> Option<u32> {
        if self.id_min == self.id_max && self.id_min == self.avoid_id {
            return None;
        }
        let raw = self.rng.gen_range(self.id_min..=self.id_max);
        if raw != self.avoid_id {
            return Some(raw);
        }
        Some(if raw < self.id_max { raw + 1 } else { self.id_min })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id_min: u32, id_max: u32) -> SimulationConfig {
        SimulationConfig {
            id_min,
            id_max,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_frames_stay_in_range() {
        let mut gen = TrafficGenerator::seeded(7, &config(0x100, 0x1FF), 0x7E8, Dialect::Csv, 8);
        for _ in 0..500 {
            let frame = gen.next_frame().unwrap();
            let can = frame.as_can().unwrap();
            assert!((0x100..=0x1FF).contains(&can.id().raw()));
            assert!((1..=8).contains(&can.data().len()));
        }
    }

    #[test]
    fn test_response_id_is_avoided() {
        let mut gen = TrafficGenerator::seeded(1, &config(0x7E7, 0x7E8), 0x7E8, Dialect::Slcan, 8);
        for _ in 0..200 {
            let frame = gen.next_frame().unwrap();
            assert_eq!(frame.as_can().unwrap().id().raw(), 0x7E7);
        }

        let mut only = TrafficGenerator::seeded(1, &config(0x7E8, 0x7E8), 0x7E8, Dialect::Csv, 8);
        assert!(only.next_frame().is_none());
    }

    #[test]
    fn test_lin_frames_have_valid_checksum() {
        let mut gen = TrafficGenerator::seeded(3, &config(0x100, 0x7FF), 0x7E8, Dialect::Lin, 8);
        for _ in 0..100 {
            match gen.next_frame().unwrap() {
                BusFrame::Lin(frame) => {
                    assert!(frame.pid().frame_id() <= MAX_LIN_SIGNAL_ID);
                    assert!(frame.checksum_valid(Default::default()));
                }
                other => panic!("expected LIN frame, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_payload_limit_respected() {
        let mut gen = TrafficGenerator::seeded(9, &config(0x100, 0x7FF), 0x7E8, Dialect::Csv, 3);
        for _ in 0..100 {
            assert!(gen.next_frame().unwrap().data().len() <= 3);
        }
    }
}
