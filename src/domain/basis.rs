//! Basic building blocks: planar positions in centimetres and compass headings in degrees.
//!
//! Headings are measured clockwise from north. The x axis points east and the y axis points
//! south, so north is the negative y direction.

use std::ops::Sub;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    x: f64,
    y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn distance(&self, position: Self) -> f64 {
        distance(*self, position)
    }

    /// Position after travelling `length` along `heading`.
    pub fn advanced(&self, heading: Heading, length: f64) -> Position {
        let radians = heading.to_radians();
        Position::new(
            self.x + length * radians.sin(),
            self.y - length * radians.cos(),
        )
    }

    pub fn scaled(&self, factor: f64) -> Position {
        Position::new(self.x * factor, self.y * factor)
    }
}

impl From<Position> for Point2<f64> {
    fn from(value: Position) -> Self {
        Point2::new(value.x, value.y)
    }
}

impl From<Position> for (f64, f64) {
    fn from(value: Position) -> Self {
        (value.x, value.y)
    }
}

impl From<(f64, f64)> for Position {
    fn from(value: (f64, f64)) -> Self {
        Position::new(value.0, value.1)
    }
}

pub fn distance(from: Position, to: Position) -> f64 {
    nalgebra::distance(&Point2::from(from), &Point2::from(to))
}

/// Compass heading in degrees, clockwise from north.
///
/// The value is kept as reported. [`Heading::to_deg`] normalizes it into `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Heading(f64);

impl Heading {
    pub const NORTH: Heading = Heading(0.0);

    pub const fn from_deg(degrees: f64) -> Self {
        Self(degrees)
    }

    pub fn to_deg(self) -> f64 {
        self.0.rem_euclid(360.0)
    }

    pub fn to_radians(self) -> f64 {
        self.0.to_radians()
    }

    /// Heading after turning clockwise by `degrees`. Negative values turn counterclockwise.
    pub fn rotated(self, degrees: f64) -> Self {
        Self((self.0 + degrees).rem_euclid(360.0))
    }

    /// Smallest angle between this heading and north, in `[0, 180]`.
    pub fn off_north(self) -> f64 {
        let degrees = self.to_deg();
        degrees.min(360.0 - degrees)
    }
}

/// Signed rotation in degrees from `rhs` to `self`.
impl Sub for Heading {
    type Output = f64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Compass bearing of the line from `from` to `to`, in `[0, 360)`.
///
/// Points sharing the same x coordinate have no slope; they resolve to 270 when `to` lies at
/// a smaller y, 90 when it lies at a larger y and 0 when both points coincide.
pub fn bearing(from: Position, to: Position) -> Heading {
    let rise = to.y - from.y;
    let run = to.x - from.x;

    if run == 0.0 {
        return Heading::from_deg(if rise < 0.0 {
            270.0
        } else if rise > 0.0 {
            90.0
        } else {
            0.0
        });
    }

    let inner_angle = (rise / run).atan().to_degrees();

    Heading::from_deg(if run < 0.0 {
        inner_angle + 270.0
    } else {
        inner_angle + 90.0
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Turn {
    Left,
    Right,
}

impl Turn {
    pub fn flipped(self) -> Self {
        match self {
            Turn::Left => Turn::Right,
            Turn::Right => Turn::Left,
        }
    }
}

/// Splits a signed rotation into the shorter of the two turns that reach the same heading.
///
/// Positive values are left turns. The returned magnitude is always within `[0, 180]`.
pub fn turn_direction(signed_turn: f64) -> (Turn, f64) {
    let mut turn = Turn::Left;
    let mut magnitude = signed_turn % 360.0;

    if magnitude < 0.0 {
        magnitude = magnitude.abs();
        turn = turn.flipped();
    }

    if magnitude > 180.0 {
        magnitude = 360.0 - magnitude;
        turn = turn.flipped();
    }

    (turn, magnitude)
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, AbsDiffEq};
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_position() {
        let position = Position::new(1.0, 2.0);
        assert_abs_diff_eq!(position.x(), 1.0);
        assert_abs_diff_eq!(position.y(), 2.0);
    }

    #[rstest]
    #[case((0.0, 0.0), (3.0, 4.0), 5.0)]
    #[case((1.0, 1.0), (1.0, 1.0), 0.0)]
    #[case((-2.0, 0.5), (1.0, -3.5), 5.0)]
    fn test_distance(#[case] from: (f64, f64), #[case] to: (f64, f64), #[case] expected: f64) {
        assert_abs_diff_eq!(
            distance(from.into(), to.into()),
            expected,
            epsilon = 1e-12
        );
    }

    #[rstest]
    #[case::east((1.0, 0.0), 90.0)]
    #[case::west((-1.0, 0.0), 270.0)]
    #[case::south_east((1.0, 1.0), 135.0)]
    #[case::north_east((1.0, -1.0), 45.0)]
    #[case::south_west((-1.0, 1.0), 225.0)]
    #[case::north_west((-1.0, -1.0), 315.0)]
    #[case::vertical_negative((0.0, -1.0), 270.0)]
    #[case::vertical_positive((0.0, 1.0), 90.0)]
    #[case::same_point((0.0, 0.0), 0.0)]
    fn test_bearing(#[case] to: (f64, f64), #[case] expected: f64) {
        assert_abs_diff_eq!(
            bearing(Position::default(), to.into()).to_deg(),
            expected,
            epsilon = 1e-9
        );
    }

    #[rstest]
    #[case::small_left(30.0, Turn::Left, 30.0)]
    #[case::small_right(-30.0, Turn::Right, 30.0)]
    #[case::long_left(270.0, Turn::Right, 90.0)]
    #[case::long_right(-270.0, Turn::Left, 90.0)]
    #[case::half(180.0, Turn::Left, 180.0)]
    #[case::none(0.0, Turn::Left, 0.0)]
    #[case::wrapped(450.0, Turn::Left, 90.0)]
    fn test_turn_direction(#[case] signed: f64, #[case] turn: Turn, #[case] magnitude: f64) {
        let (actual_turn, actual_magnitude) = turn_direction(signed);
        assert_eq!(actual_turn, turn);
        assert_abs_diff_eq!(actual_magnitude, magnitude, epsilon = 1e-9);
    }

    #[test]
    fn test_turn_direction_magnitude_is_bounded() {
        for tenth in -7200..=7200 {
            let signed = tenth as f64 / 10.0;
            let (_, magnitude) = turn_direction(signed);
            assert!(
                (0.0..=180.0).contains(&magnitude),
                "{signed} gave {magnitude}"
            );
        }
    }

    #[rstest]
    #[case(37.5)]
    #[case(-123.0)]
    #[case(200.0)]
    #[case(-350.0)]
    fn test_turn_direction_is_periodic(#[case] signed: f64) {
        let (_, magnitude) = turn_direction(signed);
        for k in 1..=3 {
            let shift = 360.0 * k as f64;
            assert_abs_diff_eq!(turn_direction(signed + shift).1, magnitude, epsilon = 1e-9);
            assert_abs_diff_eq!(turn_direction(signed - shift).1, magnitude, epsilon = 1e-9);
        }
    }

    #[rstest]
    #[case(0.0, (0.0, -10.0))]
    #[case(90.0, (10.0, 0.0))]
    #[case(180.0, (0.0, 10.0))]
    #[case(270.0, (-10.0, 0.0))]
    fn test_position_advanced(#[case] heading: f64, #[case] expected: (f64, f64)) {
        let position = Position::default().advanced(Heading::from_deg(heading), 10.0);
        assert_abs_diff_eq!(position, Position::from(expected), epsilon = 1e-9);
    }

    #[rstest]
    #[case::wrapped(-90.0, 270.0)]
    #[case::full_turn(360.0, 0.0)]
    #[case::plain(45.0, 45.0)]
    fn test_heading_to_deg(#[case] degrees: f64, #[case] expected: f64) {
        assert_abs_diff_eq!(Heading::from_deg(degrees).to_deg(), expected);
    }

    #[rstest]
    #[case::left_of_north(355.0, 5.0)]
    #[case::right_of_north(4.0, 4.0)]
    #[case::south(180.0, 180.0)]
    #[case::unwrapped(-10.0, 10.0)]
    fn test_heading_off_north(#[case] degrees: f64, #[case] expected: f64) {
        assert_abs_diff_eq!(Heading::from_deg(degrees).off_north(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_rotated_and_difference() {
        let heading = Heading::from_deg(10.0);
        assert_abs_diff_eq!(heading.rotated(-90.0).to_deg(), 280.0);
        assert_abs_diff_eq!(heading.rotated(355.0).to_deg(), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(heading - Heading::from_deg(90.0), -80.0);
    }

    impl AbsDiffEq for Position {
        type Epsilon = f64;

        fn default_epsilon() -> f64 {
            f64::EPSILON
        }

        fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
            f64::abs_diff_eq(&self.x, &other.x, epsilon)
                && f64::abs_diff_eq(&self.y, &other.y, epsilon)
        }
    }
}
