//! Profile files
//!
//! `profiles.yaml` holds every profile the user has defined:
//!
//! ```yaml
//! profiles:
//!   - name: studio
//!     rules:
//!       - gesture: pinch
//!         hand: right
//!         target: { stem: 0, param: volume }
//!       - gesture: two_hand_pinch
//!         hand: both
//!         target: { stem: 0, param: crossfade, with: 1 }
//!         priority: 10
//!         restore_on_release: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::profile::{MappingProfile, ProfileError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: Vec<MappingProfile>,
}

/// Load and validate every profile in a file
pub fn load_profiles(path: &Path) -> Result<Vec<MappingProfile>, ProfileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ProfileFile = serde_yaml::from_str(&contents)?;
    for profile in &file.profiles {
        profile.validate()?;
    }

    log::info!("[MAPPING] Loaded {} profile(s) from {:?}", file.profiles.len(), path);
    for profile in &file.profiles {
        log::debug!("  - {} ({} rules)", profile.name, profile.rules.len());
    }
    Ok(file.profiles)
}

/// Write profiles to a file, creating parent directories
pub fn save_profiles(profiles: &[MappingProfile], path: &Path) -> Result<(), ProfileError> {
    let io_error = |source| ProfileError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = ProfileFile { profiles: profiles.to_vec() };
    let yaml = serde_yaml::to_string(&file)?;
    std::fs::write(path, yaml).map_err(io_error)?;

    log::info!("[MAPPING] Saved {} profile(s) to {:?}", profiles.len(), path);
    Ok(())
}

/// Pick a profile by name (case-insensitive)
pub fn find_profile(profiles: &[MappingProfile], name: &str) -> Result<MappingProfile, ProfileError> {
    profiles
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| ProfileError::NotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{GestureKind, HandSelector};
    use crate::mapping::profile::{ControlTarget, MappingMode, MappingRule, TargetParam};

    #[test]
    fn test_save_then_load_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profiles.yaml");

        let counting = MappingProfile::new(
            "counting",
            vec![MappingRule::new(
                GestureKind::FingerCount(3),
                HandSelector::Left,
                ControlTarget::new(2, TargetParam::Mute),
                MappingMode::Toggle,
            )],
        );
        let profiles = vec![MappingProfile::default_two_hand(), counting];
        save_profiles(&profiles, &path).unwrap();

        let loaded = load_profiles(&path).unwrap();
        assert_eq!(loaded, profiles);
    }

    #[test]
    fn test_hand_written_yaml_fills_rule_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yaml");
        std::fs::write(
            &path,
            "profiles:\n\
             \x20 - name: studio\n\
             \x20   rules:\n\
             \x20     - gesture: pinch\n\
             \x20       target: { stem: 0, param: volume }\n\
             \x20     - gesture: two_hand_pinch\n\
             \x20       hand: both\n\
             \x20       target: { stem: 0, param: crossfade, with: 1 }\n\
             \x20       priority: 10\n\
             \x20       restore_on_release: true\n",
        )
        .unwrap();

        let profiles = load_profiles(&path).unwrap();
        assert_eq!(profiles.len(), 1);
        let rules = &profiles[0].rules;
        assert_eq!(rules[0].hand, HandSelector::Either);
        assert_eq!(rules[0].mode, MappingMode::Absolute);
        assert_eq!(rules[0].sensitivity, 1.0);
        assert!(rules[0].inverts());
        assert_eq!(rules[1].target, ControlTarget::crossfade(0, 1));
        assert!(rules[1].restore_on_release);
    }

    #[test]
    fn test_invalid_profile_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yaml");
        std::fs::write(
            &path,
            "profiles:\n\
             \x20 - name: broken\n\
             \x20   rules:\n\
             \x20     - gesture: fist\n\
             \x20       target: { stem: 0, param: volume }\n\
             \x20       deadzone: 0.7\n",
        )
        .unwrap();
        assert!(matches!(load_profiles(&path), Err(ProfileError::InvalidDeadzone { .. })));

        std::fs::write(&path, "profiles: [not, a, profile").unwrap();
        assert!(matches!(load_profiles(&path), Err(ProfileError::Yaml(_))));

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(load_profiles(&missing), Err(ProfileError::Io { .. })));
    }

    #[test]
    fn test_find_profile_by_name() {
        let profiles = vec![MappingProfile::default_two_hand()];
        assert_eq!(find_profile(&profiles, "TWO_HAND").unwrap().name, "two_hand");
        assert!(matches!(find_profile(&profiles, "club"), Err(ProfileError::NotFound(_))));
    }
}
