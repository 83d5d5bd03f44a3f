//! Hardware seams for the autofocus controller.
//!
//! The engine never talks to a VCM driver directly; the host pipeline
//! supplies an implementation of [`Lens`] and the engine commands it with
//! hardware position integers derived from the dioptre→hardware map.

/// Lens actuator interface.
///
/// Positions are in hardware units (driver-specific integer codes), not
/// dioptres. Implementations should accept repeated commands for the same
/// position without side effects.
pub trait Lens {
    fn set_position(
        &mut self,
        hwpos: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<L: Lens + ?Sized> Lens for Box<L> {
    fn set_position(
        &mut self,
        hwpos: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_position(hwpos)
    }
}
