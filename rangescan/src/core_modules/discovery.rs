// THEORY:
// Discovery is how robots learn where their balls are. Each robot keeps its own
// `DiscoveryList`; nothing about it is shared. When a robot's rangefinder hits a
// ball it either records the sighting (the ball is its own target) or pushes a
// copy to its peers (someone else's ball).
//
// Key architectural principles:
// 1.  **Spatial De-duplication**: A ball is swept by many rays per frame and is
//     seen again every frame. Two sightings within `min_ball_distance_threshold`
//     of each other are the same physical object, so insertion is
//     "dedup-or-append" and the list never holds two entries judged identical.
// 2.  **Naming Contract**: A tag is this robot's target when it starts with the
//     target prefix ("Ball") and ends with the robot's identity suffix (its own
//     tag minus the "Robot" prefix). `RobotRed` hunts `BallRed`.
// 3.  **Push Broadcast, Non-owning Peers**: Robots never hold references to one
//     another. Each robot lists its peers by `AgentId`, and the `AgentRoster`
//     resolves those ids when a sighting has to be forwarded. The payload is a
//     copy, so a receiving peer owns what it stores.

use crate::core_modules::agent_controller::AgentController;
use crate::error::{RangeScanError, Result};
use nalgebra::Point3;
use serde::Serialize;
use tracing::debug;

/// Identifier of a robot inside an [`AgentRoster`].
pub type AgentId = usize;

/// Where a ball was seen and what it was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSighting {
    pub position: Point3<f32>,
    pub tag: String,
}

impl TargetSighting {
    pub fn new(position: Point3<f32>, tag: impl Into<String>) -> Self {
        Self {
            position,
            tag: tag.into(),
        }
    }
}

/// Tag-matching rule deciding whether a detected object is this robot's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPredicate {
    target_prefix: String,
    identity_suffix: String,
}

impl TargetPredicate {
    /// Builds the predicate for a robot tagged `agent_tag`, e.g. `"RobotRed"`
    /// with identity prefix `"Robot"` matches `"Ball…Red"`.
    pub fn for_agent(agent_tag: &str, identity_prefix: &str, target_prefix: &str) -> Self {
        let identity_suffix = agent_tag.strip_prefix(identity_prefix).unwrap_or(agent_tag);
        Self {
            target_prefix: target_prefix.to_string(),
            identity_suffix: identity_suffix.to_string(),
        }
    }

    pub fn matches(&self, tag: &str) -> bool {
        tag.starts_with(&self.target_prefix) && tag.ends_with(&self.identity_suffix)
    }

    pub fn identity_suffix(&self) -> &str {
        &self.identity_suffix
    }
}

/// A robot's de-duplicated record of sighted targets awaiting pursuit.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryList {
    /// Sightings closer than this (inclusive) are the same object.
    threshold: f32,
    entries: Vec<TargetSighting>,
}

impl DiscoveryList {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            entries: Vec::new(),
        }
    }

    /// Index of the first stored sighting within the threshold of `position`.
    pub fn find(&self, position: &Point3<f32>) -> Option<usize> {
        self.entries
            .iter()
            .position(|s| (s.position - position).norm() <= self.threshold)
    }

    /// Appends `sighting` unless an equivalent one is already stored.
    /// Returns `true` when the list grew.
    pub fn insert(&mut self, sighting: TargetSighting) -> bool {
        if self.find(&sighting.position).is_some() {
            return false;
        }
        self.entries.push(sighting);
        true
    }

    /// Index of the sighting closest to `from`. Ties keep the earliest entry.
    pub fn nearest_to(&self, from: &Point3<f32>) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, sighting) in self.entries.iter().enumerate() {
            let distance = (sighting.position - from).norm();
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((i, distance)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn remove(&mut self, index: usize) -> Option<TargetSighting> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&TargetSighting> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetSighting> {
        self.entries.iter()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// What a robot did with a ball it saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SightingRoute {
    /// Its own target. `inserted` is `false` when the sighting was a duplicate.
    StoredLocally { inserted: bool },
    /// Someone else's target; the sighting must go to these peers.
    Forward(Vec<AgentId>),
}

/// Registry of robots addressable by [`AgentId`].
///
/// Owns the controllers; robots only ever refer to each other by id.
#[derive(Default)]
pub struct AgentRoster {
    agents: Vec<AgentController>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Adds a robot and returns the id it is known by.
    pub fn register(&mut self, mut agent: AgentController) -> AgentId {
        let id = self.agents.len();
        agent.set_id(id);
        self.agents.push(agent);
        id
    }

    /// Makes every registered robot a peer of every other one.
    pub fn connect_all(&mut self) {
        let ids: Vec<AgentId> = (0..self.agents.len()).collect();
        for agent in self.agents.iter_mut() {
            let own = agent.id();
            agent.set_peers(ids.iter().copied().filter(|&id| id != own).collect());
        }
    }

    pub fn get(&self, id: AgentId) -> Result<&AgentController> {
        self.agents.get(id).ok_or(RangeScanError::UnknownAgent(id))
    }

    pub fn get_mut(&mut self, id: AgentId) -> Result<&mut AgentController> {
        self.agents.get_mut(id).ok_or(RangeScanError::UnknownAgent(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentController> {
        self.agents.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AgentController> {
        self.agents.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Hands a ball hit seen by `from` to that robot and, if it is not its
    /// target, to each of its peers. Returns how `from` routed it.
    pub fn dispatch_ball_hit(&mut self, from: AgentId, sighting: TargetSighting) -> Result<SightingRoute> {
        let route = self.get_mut(from)?.on_ball_hit(sighting.clone());
        if let SightingRoute::Forward(peers) = &route {
            for &peer in peers {
                match self.agents.get_mut(peer) {
                    Some(agent) => {
                        agent.receive_sighting(sighting.clone());
                    }
                    None => debug!(from, peer, "dropping sighting for unregistered peer"),
                }
            }
        }
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_couples_ball_and_robot_names() {
        let red = TargetPredicate::for_agent("RobotRed", "Robot", "Ball");
        assert!(red.matches("BallRed"));
        assert!(red.matches("BallLargeRed"));
        assert!(!red.matches("BallBlue"));
        assert!(!red.matches("CubeRed"));
        assert_eq!(red.identity_suffix(), "Red");
    }

    #[test]
    fn insertion_deduplicates_within_threshold() {
        let mut list = DiscoveryList::new(1.5);
        assert!(list.insert(TargetSighting::new(Point3::new(0.0, 0.0, 0.0), "BallRed")));
        assert!(!list.insert(TargetSighting::new(Point3::new(1.5, 0.0, 0.0), "BallRed")));
        assert_eq!(list.len(), 1);

        assert!(list.insert(TargetSighting::new(Point3::new(1.6, 0.0, 0.0), "BallRed")));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn zero_threshold_only_merges_identical_positions() {
        let mut list = DiscoveryList::new(0.0);
        assert!(list.insert(TargetSighting::new(Point3::new(1.0, 0.0, 1.0), "BallRed")));
        assert!(!list.insert(TargetSighting::new(Point3::new(1.0, 0.0, 1.0), "BallRed")));
        assert!(list.insert(TargetSighting::new(Point3::new(1.0, 0.0, 1.01), "BallRed")));
    }

    #[test]
    fn nearest_is_stable_and_prefers_first_on_ties() {
        let mut list = DiscoveryList::new(0.1);
        list.insert(TargetSighting::new(Point3::new(5.0, 0.0, 0.0), "BallRed"));
        list.insert(TargetSighting::new(Point3::new(-3.0, 0.0, 0.0), "BallRed"));
        list.insert(TargetSighting::new(Point3::new(0.0, 0.0, 3.0), "BallRed"));

        let origin = Point3::origin();
        assert_eq!(list.nearest_to(&origin), Some(1));
        assert_eq!(list.nearest_to(&origin), Some(1));
        assert_eq!(DiscoveryList::new(1.0).nearest_to(&origin), None);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut list = DiscoveryList::new(1.0);
        list.insert(TargetSighting::new(Point3::origin(), "BallRed"));
        assert!(list.remove(3).is_none());
        assert!(list.remove(0).is_some());
        assert!(list.is_empty());
    }
}
