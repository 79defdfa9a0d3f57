//! Bounded ring of collision events for gameplay consumers.
//!
//! Events are observations, not simulation state: they never re-enter the
//! integrator, so the payload is plain `f32`.

/// One resolved contact. `body_a`/`body_b` may be [`GROUND_BODY_ID`] for the
/// ground plane.
///
/// [`GROUND_BODY_ID`]: crate::physics::body::GROUND_BODY_ID
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionEvent {
    pub body_a: u32,
    pub body_b: u32,
    /// Unit collision normal.
    pub nx: f32,
    pub ny: f32,
    pub nz: f32,
    /// Approximate contact point.
    pub px: f32,
    pub py: f32,
    pub pz: f32,
    /// Scalar impulse magnitude.
    pub impulse: f32,
}

/// Fixed-capacity queue; the producer never blocks, overflow drops the
/// oldest event.
#[derive(Debug, Default)]
pub struct CollisionEventQueue {
    events: Vec<CollisionEvent>,
}

impl CollisionEventQueue {
    pub const CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self { events: Vec::with_capacity(Self::CAPACITY) }
    }

    pub fn push(&mut self, event: CollisionEvent) {
        if self.events.len() >= Self::CAPACITY {
            // Shift down by dropping the oldest; O(n) but only on overflow
            self.events.remove(0);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(a: u32, b: u32) -> CollisionEvent {
        CollisionEvent { body_a: a, body_b: b, ..Default::default() }
    }

    #[test]
    fn test_push_and_clear() {
        let mut queue = CollisionEventQueue::new();
        queue.push(event(1, 2));
        queue.push(event(3, 4));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.events()[0].body_a, 1);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = CollisionEventQueue::new();
        for i in 0..CollisionEventQueue::CAPACITY as u32 + 10 {
            queue.push(event(i, 0));
        }
        assert_eq!(queue.len(), CollisionEventQueue::CAPACITY);
        // Oldest ten were dropped
        assert_eq!(queue.events()[0].body_a, 10);
        assert_eq!(
            queue.events().last().unwrap().body_a,
            CollisionEventQueue::CAPACITY as u32 + 9
        );
    }
}
