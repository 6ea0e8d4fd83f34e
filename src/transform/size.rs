//! Unit-size cache and buffer size transformation.
//!
//! The cache has exactly two slots keyed by caps *instance* identity. Only
//! the input and output caps of the current configuration matter, so slots
//! are never evicted; a third distinct caps instance is simply recomputed on
//! every lookup. `configure` clears both slots.

use super::Stage;
use crate::element::{PadDirection, TransformImpl};
use crate::error::{Error, Result};
use crate::format::Caps;
use tracing::trace;

#[derive(Debug, Default)]
pub(super) struct UnitSizeCache {
    slots: [Option<(Caps, usize)>; 2],
}

impl UnitSizeCache {
    fn lookup(&self, caps: &Caps) -> Option<usize> {
        self.slots
            .iter()
            .flatten()
            .find(|(cached, _)| Caps::ptr_eq(cached, caps))
            .map(|(_, size)| *size)
    }

    fn insert(&mut self, caps: &Caps, size: usize) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some((caps.clone(), size));
        }
    }

    pub(super) fn clear(&mut self) {
        self.slots = [None, None];
    }
}

impl<T: TransformImpl> Stage<T> {
    /// Bytes per unit for `caps`, memoized by caps identity.
    pub fn unit_size(&self, caps: &Caps) -> Option<usize> {
        if let Some(size) = self.lock_state().cache.lookup(caps) {
            return Some(size);
        }
        let size = self.imp.unit_size(caps)?;
        trace!(stage = %self.name, %caps, size, "computed unit size");
        self.lock_state().cache.insert(caps, size);
        Some(size)
    }

    /// Size of the buffer on the other pad for a `size`-byte buffer with
    /// `caps` on the `direction` pad.
    ///
    /// # Errors
    ///
    /// [`Error::SizeUnknown`] when a unit size is missing or zero,
    /// [`Error::SizeMismatch`] when `size` is not a whole number of units.
    pub fn transform_size(
        &self,
        direction: PadDirection,
        caps: &Caps,
        size: usize,
        othercaps: &Caps,
    ) -> Result<usize> {
        if let Some(out) = self.imp.transform_size(direction, caps, size, othercaps) {
            return Ok(out);
        }
        if !T::HAS_UNIT_SIZE {
            return Ok(size);
        }

        let in_unit = self
            .unit_size(caps)
            .filter(|&unit| unit > 0)
            .ok_or_else(|| Error::SizeUnknown {
                caps: caps.to_string(),
            })?;
        if size % in_unit != 0 {
            return Err(Error::SizeMismatch {
                size,
                unit_size: in_unit,
            });
        }
        let out_unit = self.unit_size(othercaps).ok_or_else(|| Error::SizeUnknown {
            caps: othercaps.to_string(),
        })?;
        (size / in_unit).checked_mul(out_unit).ok_or_else(|| {
            Error::InvalidInput(format!(
                "{size} bytes at unit size {in_unit} overflow at unit size {out_unit}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::TransformMode;
    use crate::transform::StageConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Unit size = "width" field; counts hook calls.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl TransformImpl for Counting {
        const MODE: TransformMode = TransformMode::NeverInPlace;
        const HAS_UNIT_SIZE: bool = true;

        fn unit_size(&self, caps: &Caps) -> Option<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            caps.structure(0)?.get_int("width").map(|w| w as usize)
        }
    }

    fn caps(width: i64) -> Caps {
        Caps::builder("test/units").field("width", width).build()
    }

    #[test]
    fn test_cache_hits_by_identity() {
        let stage = Stage::new(Counting::default(), StageConfig::default());
        let a = caps(4);
        assert_eq!(stage.unit_size(&a), Some(4));
        assert_eq!(stage.unit_size(&a.clone()), Some(4));
        assert_eq!(stage.imp().calls.load(Ordering::SeqCst), 1);

        // Deep-equal but distinct instance: a miss.
        assert_eq!(stage.unit_size(&caps(4)), Some(4));
        assert_eq!(stage.imp().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_third_format_is_never_cached() {
        let stage = Stage::new(Counting::default(), StageConfig::default());
        let (a, b, c) = (caps(2), caps(4), caps(8));
        stage.unit_size(&a);
        stage.unit_size(&b);
        assert_eq!(stage.imp().calls.load(Ordering::SeqCst), 2);

        for _ in 0..3 {
            assert_eq!(stage.unit_size(&c), Some(8));
        }
        assert_eq!(stage.imp().calls.load(Ordering::SeqCst), 5);

        // The first two stay cached.
        stage.unit_size(&a);
        stage.unit_size(&b);
        assert_eq!(stage.imp().calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_transform_size_unit_ratio() {
        let stage = Stage::new(Counting::default(), StageConfig::default());
        let (a, b) = (caps(2), caps(6));
        assert_eq!(stage.transform_size(PadDirection::Input, &a, 10, &b).unwrap(), 30);
        assert!(matches!(
            stage.transform_size(PadDirection::Input, &a, 11, &b),
            Err(Error::SizeMismatch { size: 11, unit_size: 2 })
        ));
    }

    #[test]
    fn test_transform_size_overflow_is_an_error() {
        let stage = Stage::new(Counting::default(), StageConfig::default());
        assert!(matches!(
            stage.transform_size(PadDirection::Input, &caps(1), usize::MAX, &caps(2)),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(
            stage
                .transform_size(PadDirection::Output, &caps(2), usize::MAX - 1, &caps(1))
                .unwrap(),
            usize::MAX / 2
        );
    }

    #[test]
    fn test_transform_size_unknown_and_zero_units() {
        let stage = Stage::new(Counting::default(), StageConfig::default());
        let unknown = Caps::builder("test/units").build();
        assert!(matches!(
            stage.transform_size(PadDirection::Input, &unknown, 8, &caps(2)),
            Err(Error::SizeUnknown { .. })
        ));
        assert!(matches!(
            stage.transform_size(PadDirection::Input, &caps(0), 8, &caps(2)),
            Err(Error::SizeUnknown { .. })
        ));
        assert!(matches!(
            stage.transform_size(PadDirection::Input, &caps(2), 8, &unknown),
            Err(Error::SizeUnknown { .. })
        ));
    }

    #[test]
    fn test_size_invariant_without_unit_size() {
        struct Plain;
        impl TransformImpl for Plain {
            const MODE: TransformMode = TransformMode::NeverInPlace;
        }
        let stage = Stage::new(Plain, StageConfig::default());
        let any = Caps::new_any();
        assert_eq!(stage.transform_size(PadDirection::Input, &any, 13, &any).unwrap(), 13);
    }

    #[test]
    fn test_clear_empties_slots() {
        let mut cache = UnitSizeCache::default();
        let a = caps(1);
        cache.insert(&a, 1);
        assert_eq!(cache.lookup(&a), Some(1));
        cache.clear();
        assert_eq!(cache.lookup(&a), None);
    }
}
