//! # Latest-Reading Buffer
//!
//! One slot holding the newest scale reading taken while the uplink was
//! down. Older readings are overwritten; there is no history.

use std::sync::Mutex;

use farmlink_core::{WeightReading, WeightUnit};

#[derive(Debug, Default)]
pub struct LatestWeightBuffer {
    slot: Mutex<Option<WeightReading>>,
}

impl LatestWeightBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever is buffered.
    pub fn set(&self, value: f64, unit: WeightUnit, stable: bool) {
        self.store(WeightReading::new(value, unit, stable));
    }

    pub fn store(&self, reading: WeightReading) {
        *self.lock() = Some(reading);
    }

    /// Takes the buffered reading, leaving the slot empty.
    pub fn get_and_clear(&self) -> Option<WeightReading> {
        self.lock().take()
    }

    pub fn get(&self) -> Option<WeightReading> {
        *self.lock()
    }

    pub fn has_value(&self) -> bool {
        self.lock().is_some()
    }

    /// Puts `reading` back unless a newer one arrived meanwhile.
    pub fn restore(&self, reading: WeightReading) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(reading);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<WeightReading>> {
        // The slot is a plain Copy value; a poisoned lock still holds valid data
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_get_and_clear() {
        let buffer = LatestWeightBuffer::new();
        assert!(!buffer.has_value());
        assert_eq!(buffer.get_and_clear(), None);
    }

    #[test]
    fn test_second_set_wins() {
        let buffer = LatestWeightBuffer::new();
        buffer.set(1.0, WeightUnit::Kilograms, false);
        buffer.set(2.5, WeightUnit::Kilograms, true);

        assert_eq!(
            buffer.get_and_clear(),
            Some(WeightReading::new(2.5, WeightUnit::Kilograms, true))
        );
        assert!(!buffer.has_value());
    }

    #[test]
    fn test_get_does_not_clear() {
        let buffer = LatestWeightBuffer::new();
        buffer.set(300.0, WeightUnit::Grams, true);
        assert!(buffer.get().is_some());
        assert!(buffer.has_value());
    }

    #[test]
    fn test_restore_never_overwrites_newer() {
        let buffer = LatestWeightBuffer::new();
        let old = WeightReading::new(1.0, WeightUnit::Pounds, true);
        let new = WeightReading::new(2.0, WeightUnit::Pounds, true);

        buffer.store(new);
        buffer.restore(old);
        assert_eq!(buffer.get(), Some(new));

        buffer.get_and_clear();
        buffer.restore(old);
        assert_eq!(buffer.get(), Some(old));
    }
}
