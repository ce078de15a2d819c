//! Ordered container of surviving trajectories.

use std::cmp::Ordering;

use crate::trajectory::Trajectory;

/// Ranks trajectories by likelihood descending; ties broken by higher
/// obs_count, then lower |vx|+|vy|, then lexicographic (x0,y0,vx,vy).
pub fn compare_trajectories(a: &Trajectory, b: &Trajectory) -> Ordering {
    b.likelihood
        .partial_cmp(&a.likelihood)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.obs_count.cmp(&a.obs_count))
        .then_with(|| {
            let speed_a = a.vx.abs() + a.vy.abs();
            let speed_b = b.vx.abs() + b.vy.abs();
            speed_a.partial_cmp(&speed_b).unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.x0.cmp(&b.x0))
        .then_with(|| a.y0.cmp(&b.y0))
        .then_with(|| a.vx.partial_cmp(&b.vx).unwrap_or(Ordering::Equal))
        .then_with(|| a.vy.partial_cmp(&b.vy).unwrap_or(Ordering::Equal))
}

/// An ordered sequence of surviving trajectories, ranked by likelihood
/// descending.
#[derive(Clone, Debug, Default)]
pub struct ResultList {
    trajectories: Vec<Trajectory>,
}

impl ResultList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(trajectories: Vec<Trajectory>) -> Self {
        let mut list = Self { trajectories };
        list.sort_by_likelihood_desc();
        list
    }

    pub fn push(&mut self, trajectory: Trajectory) {
        self.trajectories.push(trajectory);
    }

    pub fn sort_by_likelihood_desc(&mut self) {
        self.trajectories.sort_by(compare_trajectories);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Trajectory) -> bool) {
        self.trajectories.retain(|t| keep(t));
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Trajectory> {
        self.trajectories.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> {
        self.trajectories.iter()
    }

    pub fn as_slice(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn into_vec(self) -> Vec<Trajectory> {
        self.trajectories
    }
}
