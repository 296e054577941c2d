//! Per-group visibility for segmentation renders.
//!
//! Entity builders put their geoms into fixed groups: the phantom in
//! [`PHANTOM_GROUP`], the guidewire body in [`GUIDEWIRE_GROUP`] and the tip
//! in [`TIP_GROUP`]. Rendering with only some groups visible isolates one
//! structure.

use crate::{NavigateError, Result};

/// Number of geom groups the renderer distinguishes.
pub const NUM_GEOM_GROUPS: usize = 6;

/// Group of phantom geoms.
pub const PHANTOM_GROUP: usize = 0;

/// Group of guidewire body geoms.
pub const GUIDEWIRE_GROUP: usize = 1;

/// Group of tip geoms.
pub const TIP_GROUP: usize = 2;

/// Render visibility options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneOption {
    /// Visibility flag per geom group.
    pub geom_groups: [bool; NUM_GEOM_GROUPS],
}

impl Default for SceneOption {
    /// Every group visible.
    fn default() -> Self {
        Self {
            geom_groups: [true; NUM_GEOM_GROUPS],
        }
    }
}

impl SceneOption {
    /// Check whether geoms of `group` are drawn.
    #[must_use]
    pub fn is_visible(&self, group: usize) -> bool {
        self.geom_groups.get(group).copied().unwrap_or(false)
    }
}

/// Build a scene option in which exactly `geom_groups` are visible.
///
/// # Example
///
/// ```
/// use sim_navigate::{make_scene, GUIDEWIRE_GROUP, PHANTOM_GROUP, TIP_GROUP};
///
/// let option = make_scene(&[GUIDEWIRE_GROUP, TIP_GROUP]).unwrap();
/// assert!(option.is_visible(TIP_GROUP));
/// assert!(!option.is_visible(PHANTOM_GROUP));
/// ```
///
/// # Errors
///
/// Returns [`NavigateError::InvalidGeomGroup`] for a group index outside
/// `0..NUM_GEOM_GROUPS`.
pub fn make_scene(geom_groups: &[usize]) -> Result<SceneOption> {
    let mut option = SceneOption {
        geom_groups: [false; NUM_GEOM_GROUPS],
    };
    for &group in geom_groups {
        let slot = option
            .geom_groups
            .get_mut(group)
            .ok_or(NavigateError::InvalidGeomGroup {
                group,
                max: NUM_GEOM_GROUPS,
            })?;
        *slot = true;
    }
    Ok(option)
}
