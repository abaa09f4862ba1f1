//! Periodic boundary unwrapping for trajectory continuity.
//!
//! Displacement statistics require continuous particle paths. Simulation
//! output is usually wrapped into the primary cell, so each frame-to-frame
//! step is replaced by its minimum image and accumulated.

use crate::error::{KernelError, Result};
use crate::periodic::PeriodicBox;
use crate::trajectory::Trajectory;
use crate::util::add;

/// Unwrap a trajectory to remove periodic boundary jumps.
///
/// # Arguments
/// * `trajectory` - Wrapped trajectory
/// * `boxes` - Box for each frame; the step into frame `t` uses `boxes[t]`
///
/// # Returns
/// Unwrapped trajectory whose first frame equals the input's first frame
pub fn unwrap_trajectory(trajectory: &Trajectory, boxes: &[PeriodicBox]) -> Result<Trajectory> {
    let num_frames = trajectory.n_frames();
    if boxes.len() != num_frames {
        return Err(KernelError::invalid(format!(
            "Number of boxes ({}) must match number of frames ({})",
            boxes.len(),
            num_frames
        )));
    }
    Ok(unwrap_with(trajectory, |frame_idx| &boxes[frame_idx]))
}

/// Unwrap a trajectory simulated in a single fixed box.
pub fn unwrap_trajectory_fixed_box(trajectory: &Trajectory, pbc: &PeriodicBox) -> Trajectory {
    unwrap_with(trajectory, |_| pbc)
}

fn unwrap_with<'a, F>(trajectory: &Trajectory, box_for_frame: F) -> Trajectory
where
    F: Fn(usize) -> &'a PeriodicBox,
{
    let num_frames = trajectory.n_frames();
    let num_particles = trajectory.n_particles();
    let mut result = Vec::with_capacity(num_frames * num_particles);

    // First frame: copy directly
    result.extend_from_slice(trajectory.frame(0));

    for frame_idx in 1..num_frames {
        let pbc = box_for_frame(frame_idx);
        let prev_offset = (frame_idx - 1) * num_particles;
        for atom_idx in 0..num_particles {
            let curr = trajectory.position(frame_idx, atom_idx);
            let prev = trajectory.position(frame_idx - 1, atom_idx);
            let step = pbc.minimum_image(&curr, &prev);
            let last = result[prev_offset + atom_idx];
            result.push(add(&last, &step));
        }
    }

    log::debug!(
        "Unwrapped {} particles over {} frames",
        num_particles,
        num_frames
    );
    Trajectory::from_validated(result, num_frames, num_particles)
}
