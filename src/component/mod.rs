// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Component and profile registries. Components are parsed from data
//! descriptors at engine init and map (name, level) pairs to the node-types
//! a scope should expose; profiles are fixed presets composed of components.

use crate::{
    error::SceneError,
    node::{metatype::NodeType, registry::MetatypeRegistry},
    scope::Scope,
};
use serde::Deserialize;
use welt_core::{io::FileError, log::Log};

#[derive(Deserialize)]
struct NodeTypeEntry {
    name: String,
    metatype: String,
}

#[derive(Deserialize)]
struct LevelDescriptor {
    nodes: Vec<NodeTypeEntry>,
}

#[derive(Deserialize)]
struct ComponentDescriptor {
    name: String,
    levels: Vec<LevelDescriptor>,
}

/// One component: a name and the node-type set each support level supplies.
pub struct Component {
    descriptor: ComponentDescriptor,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The highest level this registry can satisfy.
    pub fn support_level(&self) -> u32 {
        self.descriptor.levels.len() as u32
    }

    /// True if the component supplies a node-type with the given local name
    /// at any level.
    pub fn provides(&self, node_name: &str) -> bool {
        self.descriptor
            .levels
            .iter()
            .any(|level| level.nodes.iter().any(|entry| entry.name == node_name))
    }

    /// Installs the node-types of the given level (and everything below it)
    /// into the scope.
    pub fn add_to_scope(
        &self,
        metatypes: &MetatypeRegistry,
        scope: &Scope,
        level: u32,
    ) -> Result<(), SceneError> {
        if level == 0 || level > self.support_level() {
            return Err(SceneError::UnsupportedComponentLevel {
                component: self.descriptor.name.clone(),
                level,
            });
        }
        for level_descriptor in &self.descriptor.levels[..level as usize] {
            for entry in &level_descriptor.nodes {
                let Some(metatype) = metatypes.find(&entry.metatype) else {
                    Log::warn(format!(
                        "Component {}: metatype {} is not registered; skipping {}.",
                        self.descriptor.name, entry.metatype, entry.name
                    ));
                    continue;
                };
                let interfaces = metatype.interfaces().clone();
                let ty = NodeType::new(metatype, entry.name.clone(), interfaces)?;
                scope.add_type(ty);
            }
        }
        Ok(())
    }
}

/// The descriptors compiled into the engine, discovered at init.
const DESCRIPTORS: &[&str] = &[
    include_str!("data/vrml97.ron"),
    include_str!("data/core.ron"),
    include_str!("data/time.ron"),
    include_str!("data/grouping.ron"),
    include_str!("data/rendering.ron"),
    include_str!("data/shape.ron"),
    include_str!("data/geometry3d.ron"),
    include_str!("data/lighting.ron"),
    include_str!("data/interpolation.ron"),
    include_str!("data/pointing_device_sensor.ron"),
    include_str!("data/key_device_sensor.ron"),
    include_str!("data/environmental_effects.ron"),
    include_str!("data/environmental_sensor.ron"),
    include_str!("data/navigation.ron"),
    include_str!("data/scripting.ron"),
    include_str!("data/text.ron"),
    include_str!("data/sound.ron"),
    include_str!("data/texturing.ron"),
    include_str!("data/networking.ron"),
];

/// Immutable after engine init; reads need no locking.
pub struct ComponentRegistry {
    components: Vec<Component>,
}

impl ComponentRegistry {
    pub fn new() -> Result<Self, SceneError> {
        let mut components = Vec::with_capacity(DESCRIPTORS.len());
        for source in DESCRIPTORS {
            let descriptor: ComponentDescriptor = ron::from_str(source).map_err(|e| {
                SceneError::Io(FileError::Custom(format!(
                    "malformed component descriptor: {e}"
                )))
            })?;
            components.push(Component { descriptor });
        }
        Ok(Self { components })
    }

    pub fn find(&self, name: &str) -> Option<&Component> {
        self.components
            .iter()
            .find(|component| component.name() == name)
    }

    /// True if any component at any level supplies the node-type name. Used
    /// to distinguish "unknown node type" from "known but outside the active
    /// profile".
    pub fn any_component_provides(&self, node_name: &str) -> bool {
        self.components
            .iter()
            .any(|component| component.provides(node_name))
    }
}

/// A profile: a named preset of (component, level) pairs.
pub struct Profile {
    name: &'static str,
    components: Vec<(&'static str, u32)>,
}

impl Profile {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn components(&self) -> &[(&'static str, u32)] {
        &self.components
    }

    /// Builds a fresh root scope for a world. Unknown components and
    /// unsupported levels are logged but do not fail profile application.
    pub fn create_root_scope(
        &self,
        components: &ComponentRegistry,
        metatypes: &MetatypeRegistry,
        uri: &str,
    ) -> Scope {
        let scope = Scope::new(uri, None);
        for (name, level) in &self.components {
            match components.find(name) {
                Some(component) => {
                    Log::verify(component.add_to_scope(metatypes, &scope, *level));
                }
                None => {
                    Log::warn(format!(
                        "Profile {}: unknown component {name}; skipping.",
                        self.name
                    ));
                }
            }
        }
        scope
    }
}

/// The fixed profile set. Immutable after engine init.
pub struct ProfileRegistry {
    profiles: Vec<Profile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry {
    pub fn new() -> Self {
        let interchange = vec![
            ("Core", 1),
            ("Time", 1),
            ("Grouping", 1),
            ("Rendering", 1),
            ("Shape", 1),
            ("Geometry3D", 2),
            ("Lighting", 1),
            ("Interpolation", 2),
            ("Texturing", 1),
            ("Navigation", 1),
            ("EnvironmentalEffects", 1),
        ];
        let mut interactive = interchange.clone();
        interactive.extend([
            ("Grouping", 2),
            ("PointingDeviceSensor", 1),
            ("KeyDeviceSensor", 2),
            ("EnvironmentalSensor", 1),
            ("Networking", 1),
        ]);
        let mut immersive = interactive.clone();
        immersive.extend([
            ("Geometry3D", 3),
            ("Lighting", 2),
            ("Scripting", 1),
            ("Text", 1),
            ("Sound", 1),
            ("Texturing", 2),
        ]);
        let full = vec![
            ("Core", 1),
            ("Time", 1),
            ("Grouping", 2),
            ("Rendering", 1),
            ("Shape", 1),
            ("Geometry3D", 3),
            ("Lighting", 2),
            ("Interpolation", 2),
            ("PointingDeviceSensor", 1),
            ("KeyDeviceSensor", 2),
            ("EnvironmentalEffects", 1),
            ("EnvironmentalSensor", 1),
            ("Navigation", 1),
            ("Scripting", 1),
            ("Text", 1),
            ("Sound", 1),
            ("Texturing", 2),
            ("Networking", 1),
        ];

        Self {
            profiles: vec![
                Profile {
                    name: "VRML97",
                    components: vec![("VRML97", 1)],
                },
                Profile {
                    name: "Core",
                    components: vec![("Core", 1)],
                },
                Profile {
                    name: "Interchange",
                    components: interchange,
                },
                Profile {
                    name: "Interactive",
                    components: interactive,
                },
                Profile {
                    name: "Immersive",
                    components: immersive,
                },
                Profile {
                    name: "Full",
                    components: full,
                },
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }
}

#[cfg(test)]
mod test {
    use super::{ComponentRegistry, ProfileRegistry};
    use crate::node::registry::MetatypeRegistry;
    use crate::vrml97;

    fn metatypes() -> MetatypeRegistry {
        let registry = MetatypeRegistry::new();
        for metatype in vrml97::standard_metatypes() {
            registry.register(metatype);
        }
        registry
    }

    #[test]
    fn descriptors_parse() {
        let registry = ComponentRegistry::new().unwrap();
        assert!(registry.find("VRML97").is_some());
        assert_eq!(registry.find("Grouping").unwrap().support_level(), 2);
    }

    #[test]
    fn vrml97_profile_installs_standard_types() {
        let components = ComponentRegistry::new().unwrap();
        let metatypes = metatypes();
        let profiles = ProfileRegistry::new();
        let scope = profiles.find("VRML97").unwrap().create_root_scope(
            &components,
            &metatypes,
            "file:///test.wrl",
        );
        assert!(scope.find_type("Group").is_some());
        assert!(scope.find_type("TimeSensor").is_some());
        assert!(scope.find_type("KeySensor").is_none());
    }

    #[test]
    fn interchange_excludes_key_device_sensors() {
        let components = ComponentRegistry::new().unwrap();
        let metatypes = metatypes();
        let profiles = ProfileRegistry::new();
        let scope = profiles.find("Interchange").unwrap().create_root_scope(
            &components,
            &metatypes,
            "file:///test.x3dv",
        );
        assert!(scope.find_type("Box").is_some());
        assert!(scope.find_type("KeySensor").is_none());
        assert!(components.any_component_provides("KeySensor"));
    }

    #[test]
    fn unsupported_level_is_an_error() {
        let components = ComponentRegistry::new().unwrap();
        let metatypes = metatypes();
        let scope = crate::scope::Scope::new("root", None);
        let err = components
            .find("Time")
            .unwrap()
            .add_to_scope(&metatypes, &scope, 9)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::SceneError::UnsupportedComponentLevel { level: 9, .. }
        ));
    }
}
