use regex::Regex;
use serde::Serialize;

const SECTION_HEADER: &str = r"^\[([A-Za-z_][A-Za-z0-9_]*)(.*)\]\s*$";
const ATTRIBUTE: &str =
    r#"([A-Za-z_][A-Za-z0-9_]*)=("(?:[^"\\]|\\.)*"|[A-Za-z_][A-Za-z0-9_]*\([^)]*\)|[^\s\]]+)"#;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SceneFileNode {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// `None` for the scene root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Static summary of a text scene (`.tscn`) file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParsedScene {
    pub load_steps: Option<u32>,
    pub format: Option<u32>,
    pub ext_resource_count: usize,
    pub sub_resource_count: usize,
    pub ext_resources: Vec<String>,
    pub nodes: Vec<SceneFileNode>,
    pub connection_count: usize,
}

pub fn parse_tscn(source: &str) -> Result<ParsedScene, regex::Error> {
    let section_header = Regex::new(SECTION_HEADER)?;
    let attribute = Regex::new(ATTRIBUTE)?;
    let mut scene = ParsedScene::default();
    for line in source.lines() {
        let Some(captures) = section_header.captures(line.trim()) else {
            continue;
        };
        let section = captures.get(1).map_or("", |m| m.as_str());
        let rest = captures.get(2).map_or("", |m| m.as_str());
        let attr = |key: &str| -> Option<String> {
            attribute
                .captures_iter(rest)
                .find(|c| c.get(1).is_some_and(|m| m.as_str() == key))
                .and_then(|c| c.get(2))
                .map(|m| m.as_str().trim_matches('"').to_string())
        };

        match section {
            "gd_scene" => {
                scene.load_steps = attr("load_steps").and_then(|v| v.parse().ok());
                scene.format = attr("format").and_then(|v| v.parse().ok());
            }
            "ext_resource" => {
                scene.ext_resource_count += 1;
                if let Some(path) = attr("path") {
                    scene.ext_resources.push(path);
                }
            }
            "sub_resource" => scene.sub_resource_count += 1,
            "node" => scene.nodes.push(SceneFileNode {
                name: attr("name").unwrap_or_default(),
                node_type: attr("type"),
                parent: attr("parent"),
                instance: attr("instance"),
            }),
            "connection" => scene.connection_count += 1,
            _ => {}
        }
    }
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER_SCENE: &str = r#"[gd_scene load_steps=4 format=3 uid="uid://b3k2x"]

[ext_resource type="Script" path="res://scripts/player.gd" id="1_p"]
[ext_resource type="PackedScene" path="res://scenes/gun.tscn" id="2_g"]

[sub_resource type="RectangleShape2D" id="shape_1"]
size = Vector2(16, 32)

[node name="Player" type="CharacterBody2D"]
script = ExtResource("1_p")

[node name="Collision" type="CollisionShape2D" parent="."]
shape = SubResource("shape_1")

[node name="Gun" parent="." instance=ExtResource("2_g")]

[connection signal="body_entered" from="." to="." method="_on_hit"]
"#;

    #[test]
    fn parse_tscn_counts_resources_and_lists_nodes() {
        let scene = parse_tscn(PLAYER_SCENE).expect("patterns should compile");
        assert_eq!(scene.load_steps, Some(4));
        assert_eq!(scene.format, Some(3));
        assert_eq!(scene.ext_resource_count, 2);
        assert_eq!(scene.sub_resource_count, 1);
        assert_eq!(scene.connection_count, 1);
        assert_eq!(
            scene.ext_resources,
            vec!["res://scripts/player.gd", "res://scenes/gun.tscn"]
        );

        assert_eq!(scene.nodes.len(), 3);
        assert_eq!(scene.nodes[0].name, "Player");
        assert_eq!(scene.nodes[0].parent, None);
        assert_eq!(scene.nodes[1].node_type.as_deref(), Some("CollisionShape2D"));
        assert_eq!(scene.nodes[1].parent.as_deref(), Some("."));
        assert_eq!(scene.nodes[2].node_type, None);
        assert_eq!(scene.nodes[2].instance.as_deref(), Some("ExtResource(\"2_g\")"));
    }

    #[test]
    fn parse_tscn_ignores_property_lines_and_garbage() {
        let scene = parse_tscn("not a scene\nsize = Vector2(1, 1)\n[").expect("patterns should compile");
        assert_eq!(scene, ParsedScene::default());
    }
}
