use std::cell::Cell;

use super::{MobilityModel, Position};

/// A node that stays where it was put until it is moved explicitly.
#[derive(Debug, Default)]
pub struct ConstantPosition {
    position: Cell<Position>,
}

impl ConstantPosition {
    pub fn new(position: Position) -> Self {
        ConstantPosition { position: Cell::new(position) }
    }

    pub fn set_position(&self, position: Position) {
        self.position.set(position);
    }
}

impl MobilityModel for ConstantPosition {
    fn position(&self) -> Position {
        self.position.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_only_when_told() {
        let a = ConstantPosition::new(Position::new(0.0, 0.0, 0.0));
        let b = ConstantPosition::new(Position::new(3.0, 4.0, 0.0));
        assert_eq!(a.distance_to(&b), 5.0);
        b.set_position(Position::new(0.0, 10.0, 0.0));
        assert_eq!(a.distance_to(&b), 10.0);
    }
}
