//! Trajectory synthesis.
//!
//! Turns the sparse key frames observed during a session into the dense
//! replay the server scores. Everything here is pure.

use serde::ser::{Serialize, SerializeSeq, Serializer};

/// Interpolated points inserted between each pair of key frames, plus one.
pub const INTERPOLATION_STEPS: usize = 30;

pub type Point = (i64, i64);

/// Screen position derived from one `gameState` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFrame {
    pub x: i64,
    pub y: i64,
    pub frame: i64,
    pub direction: i64,
}

impl KeyFrame {
    /// Position for a tick. The server validates submitted replays
    /// against exactly this motion model.
    pub fn from_tick(frame: i64, direction: i64) -> Self {
        Self {
            x: 450 + frame * 2 + direction * 5,
            y: 426 + frame * 2 - direction * 3,
            frame,
            direction,
        }
    }

    pub fn point(&self) -> Point {
        (self.x, self.y)
    }
}

/// One entry of the `frs` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPoint {
    /// `[x, y]`
    Plain(Point),
    /// `[x, y, frame, direction]`
    Tagged { x: i64, y: i64, frame: i64, direction: i64 },
}

impl ReplayPoint {
    pub fn point(&self) -> Point {
        match *self {
            ReplayPoint::Plain(p) => p,
            ReplayPoint::Tagged { x, y, .. } => (x, y),
        }
    }
}

impl From<KeyFrame> for ReplayPoint {
    fn from(kf: KeyFrame) -> Self {
        if kf.direction == 0 {
            ReplayPoint::Plain(kf.point())
        } else {
            ReplayPoint::Tagged {
                x: kf.x,
                y: kf.y,
                frame: kf.frame,
                direction: kf.direction,
            }
        }
    }
}

impl Serialize for ReplayPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            ReplayPoint::Plain((x, y)) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&x)?;
                seq.serialize_element(&y)?;
                seq.end()
            }
            ReplayPoint::Tagged { x, y, frame, direction } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(&x)?;
                seq.serialize_element(&y)?;
                seq.serialize_element(&frame)?;
                seq.serialize_element(&direction)?;
                seq.end()
            }
        }
    }
}

/// Dense trajectory submitted with the `end` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPayload {
    points: Vec<ReplayPoint>,
}

impl ReplayPayload {
    /// Build the replay from captured key frames:
    /// `kf0, interp(kf0, kf1), kf1, interp(kf1, kf2), kf2, ...`.
    ///
    /// With fewer than two key frames the replay is the key frames as-is.
    pub fn from_key_frames(key_frames: &[KeyFrame], steps: usize) -> Self {
        let Some(first) = key_frames.first() else {
            return Self { points: Vec::new() };
        };

        let per_gap = steps.saturating_sub(1);
        let mut points = Vec::with_capacity(key_frames.len() * (per_gap + 1));
        points.push(ReplayPoint::from(*first));

        for pair in key_frames.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            points.extend(
                interpolate(prev.point(), curr.point(), steps)
                    .into_iter()
                    .map(ReplayPoint::Plain),
            );
            points.push(ReplayPoint::from(curr));
        }

        Self { points }
    }

    pub fn points(&self) -> &[ReplayPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Serialize for ReplayPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.points.serialize(serializer)
    }
}

/// `steps - 1` points strictly between `p0` and `p1`, at `t = i / steps`.
pub fn interpolate(p0: Point, p1: Point, steps: usize) -> Vec<Point> {
    (1..steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            (lerp(p0.0, p1.0, t), lerp(p0.1, p1.1, t))
        })
        .collect()
}

/// Linear interpolation rounded half-up, as the game client does it.
fn lerp(a: i64, b: i64, t: f64) -> i64 {
    let v = a as f64 + (b - a) as f64 * t;
    (v + 0.5).floor() as i64
}
