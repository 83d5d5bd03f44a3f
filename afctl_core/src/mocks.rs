//! Test and helper mocks for afctl_core.

/// A lens that records every commanded hardware position.
#[derive(Debug, Default)]
pub struct MockLens {
    pub positions: Vec<i32>,
}

impl afctl_traits::Lens for MockLens {
    fn set_position(
        &mut self,
        hwpos: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.positions.push(hwpos);
        Ok(())
    }
}

/// A lens that always fails; useful for exercising the error path.
#[derive(Debug, Default)]
pub struct FailingLens;

impl afctl_traits::Lens for FailingLens {
    fn set_position(
        &mut self,
        _hwpos: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("lens fault")))
    }
}
