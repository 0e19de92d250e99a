//! Advisory checks on the host scene and configuration.

use std::fmt;

use nebula_config::Config;

use crate::program::SKYBOX;

/// What the host tells the pipeline about its scene setup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSetup {
    /// Program bound by the sky material, `None` when there is no sky material.
    pub sky_program: Option<String>,
    /// A directional light has been assigned as the sun.
    pub has_sun: bool,
    /// The sun light renders a shadow map.
    pub sun_casts_shadows: bool,
}

/// One unmet precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingSkyMaterial,
    WrongSkyProgram { found: String },
    MissingSun,
    LightShaftsWithoutShadows,
    LightShaftsWithoutFog,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSkyMaterial => write!(f, "no sky material assigned"),
            Self::WrongSkyProgram { found } => {
                write!(f, "sky material uses '{found}', expected '{SKYBOX}'")
            }
            Self::MissingSun => write!(f, "no sun light assigned"),
            Self::LightShaftsWithoutShadows => {
                write!(f, "light shafts are enabled but the sun casts no shadows")
            }
            Self::LightShaftsWithoutFog => {
                write!(f, "light shafts are enabled but atmospheric fog is disabled")
            }
        }
    }
}

/// Every issue found by [`validate`]. Empty means the setup is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "atmospheric scattering setup is valid");
        }
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {issue}")?;
        }
        Ok(())
    }
}

/// Check the scene and configuration. Never blocks initialization.
pub fn validate(scene: &SceneSetup, config: &Config) -> ValidationReport {
    let mut issues = Vec::new();

    match &scene.sky_program {
        None => issues.push(ValidationIssue::MissingSkyMaterial),
        Some(program) if program != SKYBOX => issues.push(ValidationIssue::WrongSkyProgram {
            found: program.clone(),
        }),
        Some(_) => {}
    }
    if !scene.has_sun {
        issues.push(ValidationIssue::MissingSun);
    }
    if config.light_shafts.enabled {
        if !scene.sun_casts_shadows {
            issues.push(ValidationIssue::LightShaftsWithoutShadows);
        }
        if !config.scattering.render_atmospheric_fog {
            issues.push(ValidationIssue::LightShaftsWithoutFog);
        }
    }

    ValidationReport { issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_scene() -> SceneSetup {
        SceneSetup {
            sky_program: Some(SKYBOX.to_string()),
            has_sun: true,
            sun_casts_shadows: true,
        }
    }

    #[test]
    fn test_complete_setup_is_clean() {
        let report = validate(&complete_scene(), &Config::default());
        assert!(report.is_clean(), "{report}");
        assert_eq!(report.to_string(), "atmospheric scattering setup is valid");
    }

    #[test]
    fn test_empty_scene_reports_everything() {
        let mut config = Config::default();
        config.scattering.render_atmospheric_fog = false;
        let report = validate(&SceneSetup::default(), &config);
        assert_eq!(
            report.issues,
            vec![
                ValidationIssue::MissingSkyMaterial,
                ValidationIssue::MissingSun,
                ValidationIssue::LightShaftsWithoutShadows,
                ValidationIssue::LightShaftsWithoutFog,
            ]
        );
        assert_eq!(report.to_string().lines().count(), 4);
    }

    #[test]
    fn test_wrong_sky_program() {
        let mut scene = complete_scene();
        scene.sky_program = Some("skybox/procedural".to_string());
        let report = validate(&scene, &Config::default());
        assert_eq!(report.issues.len(), 1);
        assert!(report.to_string().contains("skybox/procedural"));
    }

    #[test]
    fn test_shaft_checks_skipped_when_disabled() {
        let mut scene = complete_scene();
        scene.sun_casts_shadows = false;
        let mut config = Config::default();
        config.light_shafts.enabled = false;
        assert!(validate(&scene, &config).is_clean());
    }
}
