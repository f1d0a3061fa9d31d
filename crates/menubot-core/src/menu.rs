//! Declarative conversation menu.
//!
//! The graph is loaded once at startup and is read-only afterwards. All
//! structural checks happen in `MenuGraph::from_toml`, so a graph that exists
//! is closed (every option target resolves) and has a `root` node.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    sync::OnceLock,
};

use regex::Regex;
use serde::Deserialize;

use crate::{
    errors::Error,
    messaging::types::{InlineButton, InlineKeyboard},
    Result,
};

/// Initial state of every chat, and the target of `/start`.
pub const ROOT_STATE: &str = "root";

const BUILTIN_MENU: &str = include_str!("../assets/default_menu.toml");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub callback_token: String,
    pub target_state: String,
    /// Optional toast shown when the button is acknowledged.
    pub toast: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuNode {
    pub state_id: String,
    pub prompt_text: String,
    pub photo_url: Option<String>,
    pub options: Vec<MenuOption>,
    /// Keyboard buttons per row.
    pub columns: usize,
    /// Reply by editing the pressed keyboard's message instead of sending a
    /// new one (text nodes only).
    pub edit_in_place: bool,
}

impl MenuNode {
    /// First option bound to `token`.
    pub fn find_option(&self, token: &str) -> Option<&MenuOption> {
        self.options.iter().find(|o| o.callback_token == token)
    }

    pub fn keyboard(&self) -> Option<InlineKeyboard> {
        if self.options.is_empty() {
            return None;
        }
        let buttons = self
            .options
            .iter()
            .map(|o| InlineButton {
                label: o.label.clone(),
                callback_data: o.callback_token.clone(),
            })
            .collect();
        Some(InlineKeyboard::with_columns(buttons, self.columns))
    }
}

#[derive(Clone, Debug)]
pub struct MenuGraph {
    nodes: Vec<MenuNode>,
    index: HashMap<String, usize>,
    root: usize,
}

// ============== TOML schema ==============

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MenuFile {
    #[serde(default, rename = "node")]
    nodes: Vec<NodeDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDef {
    id: String,
    prompt: String,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default = "default_columns")]
    columns: usize,
    #[serde(default)]
    edit_in_place: bool,
    #[serde(default)]
    options_from: Option<String>,
    #[serde(default, rename = "option")]
    options: Vec<OptionDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionDef {
    label: String,
    token: String,
    target: String,
    #[serde(default)]
    toast: Option<String>,
}

fn default_columns() -> usize {
    1
}

// ============== Loading ==============

impl MenuGraph {
    /// The menu compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_MENU)
    }

    /// Load from `path`, or the built-in menu when no path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let src = fs::read_to_string(path).map_err(|e| Error::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&src)
    }

    pub fn from_toml(src: &str) -> Result<Self> {
        let file: MenuFile = toml::from_str(src)?;
        Self::build(file.nodes)
    }

    fn build(defs: Vec<NodeDef>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            if def.id.trim().is_empty() {
                return Err(Error::Menu(format!("node #{} has an empty id", i + 1)));
            }
            if index.insert(def.id.clone(), i).is_some() {
                return Err(Error::Menu(format!("duplicate state id `{}`", def.id)));
            }
        }
        let Some(&root) = index.get(ROOT_STATE) else {
            return Err(Error::Menu(format!("missing `{ROOT_STATE}` node")));
        };

        // Resolve `options_from` (one level: the source must define its own options).
        let mut resolved: Vec<Vec<MenuOption>> = Vec::with_capacity(defs.len());
        for def in &defs {
            let opts = match &def.options_from {
                None => own_options(def),
                Some(_) if !def.options.is_empty() => {
                    return Err(Error::Menu(format!(
                        "node `{}` sets both `options_from` and its own options",
                        def.id
                    )));
                }
                Some(src_id) => {
                    let src = index.get(src_id).map(|&i| &defs[i]).ok_or_else(|| {
                        Error::Menu(format!(
                            "node `{}` takes options from unknown node `{src_id}`",
                            def.id
                        ))
                    })?;
                    if src.options_from.is_some() {
                        return Err(Error::Menu(format!(
                            "node `{}` takes options from `{src_id}`, which itself uses `options_from`",
                            def.id
                        )));
                    }
                    own_options(src)
                }
            };
            resolved.push(opts);
        }

        let mut nodes = Vec::with_capacity(defs.len());
        for (def, options) in defs.into_iter().zip(resolved) {
            let node = MenuNode {
                state_id: def.id,
                prompt_text: def.prompt,
                photo_url: def.photo_url.filter(|u| !u.trim().is_empty()),
                options,
                columns: def.columns,
                edit_in_place: def.edit_in_place,
            };
            validate_node(&node, &index)?;
            nodes.push(node);
        }

        Ok(Self { nodes, index, root })
    }
}

fn own_options(def: &NodeDef) -> Vec<MenuOption> {
    def.options
        .iter()
        .map(|o| MenuOption {
            label: o.label.clone(),
            callback_token: o.token.clone(),
            target_state: o.target.clone(),
            toast: o.toast.clone(),
        })
        .collect()
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Telegram caps callback_data at 64 bytes.
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_:.\-]{1,64}$").expect("valid regex"))
}

fn validate_node(node: &MenuNode, index: &HashMap<String, usize>) -> Result<()> {
    let id = &node.state_id;
    if node.prompt_text.trim().is_empty() {
        return Err(Error::Menu(format!("node `{id}` has an empty prompt")));
    }
    if node.columns == 0 {
        return Err(Error::Menu(format!("node `{id}` has zero columns")));
    }

    let mut seen = HashSet::new();
    for opt in &node.options {
        let token = &opt.callback_token;
        if !token_re().is_match(token) {
            return Err(Error::Menu(format!(
                "node `{id}`: invalid callback token `{token}` (1-64 chars of [A-Za-z0-9_:.-])"
            )));
        }
        if !seen.insert(token.as_str()) {
            return Err(Error::Menu(format!(
                "node `{id}`: duplicate callback token `{token}`"
            )));
        }
        if opt.label.trim().is_empty() {
            return Err(Error::Menu(format!(
                "node `{id}`: option `{token}` has an empty label"
            )));
        }
        if !index.contains_key(&opt.target_state) {
            return Err(Error::Menu(format!(
                "node `{id}`: option `{token}` targets unknown state `{}`",
                opt.target_state
            )));
        }
    }
    Ok(())
}

// ============== Lookup ==============

impl MenuGraph {
    pub fn root(&self) -> &MenuNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, state_id: &str) -> Option<&MenuNode> {
        self.index.get(state_id).map(|&i| &self.nodes[i])
    }

    /// `state_id`'s node, or root for states the graph does not know.
    pub fn node_or_root(&self, state_id: &str) -> &MenuNode {
        self.node(state_id).unwrap_or_else(|| self.root())
    }

    /// Nodes in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &MenuNode> {
        self.nodes.iter()
    }

    pub fn state_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu_err(src: &str) -> String {
        match MenuGraph::from_toml(src) {
            Err(Error::Menu(msg)) => msg,
            other => panic!("expected menu error, got {other:?}"),
        }
    }

    #[test]
    fn builtin_menu_is_closed() {
        let menu = MenuGraph::builtin().unwrap();
        assert_eq!(menu.root().state_id, ROOT_STATE);
        for node in menu.nodes() {
            for opt in &node.options {
                assert!(
                    menu.node(&opt.target_state).is_some(),
                    "{} -> {}",
                    node.state_id,
                    opt.target_state
                );
            }
        }
    }

    #[test]
    fn builtin_menu_shape() {
        let menu = MenuGraph::builtin().unwrap();
        let root = menu.root();
        assert!(root.photo_url.is_some());
        assert_eq!(root.keyboard().unwrap().tokens(), vec!["more_info", "start"]);

        let start = menu.node("start").unwrap();
        assert_eq!(start.options.len(), 6);
        assert_eq!(start.keyboard().unwrap().rows.len(), 3);

        // Leaves and more_info return to root's options.
        for id in ["more_info", "choice_di", "choice_podcasts"] {
            assert_eq!(menu.node(id).unwrap().options, root.options);
        }
        assert!(menu
            .node("choice_di")
            .unwrap()
            .prompt_text
            .starts_with("You selected: DI"));
    }

    #[test]
    fn rejects_dangling_target() {
        let msg = menu_err(
            r#"
            [[node]]
            id = "root"
            prompt = "hi"
            [[node.option]]
            label = "Go"
            token = "go"
            target = "nowhere"
            "#,
        );
        assert!(msg.contains("unknown state `nowhere`"), "{msg}");
    }

    #[test]
    fn rejects_missing_root() {
        let msg = menu_err(
            r#"
            [[node]]
            id = "home"
            prompt = "hi"
            "#,
        );
        assert!(msg.contains("missing `root`"), "{msg}");
    }

    #[test]
    fn rejects_duplicate_tokens_and_states() {
        let dup_token = menu_err(
            r#"
            [[node]]
            id = "root"
            prompt = "hi"
            [[node.option]]
            label = "A"
            token = "x"
            target = "root"
            [[node.option]]
            label = "B"
            token = "x"
            target = "root"
            "#,
        );
        assert!(dup_token.contains("duplicate callback token `x`"));

        let dup_state = menu_err(
            r#"
            [[node]]
            id = "root"
            prompt = "hi"
            [[node]]
            id = "root"
            prompt = "again"
            "#,
        );
        assert!(dup_state.contains("duplicate state id `root`"));
    }

    #[test]
    fn rejects_bad_tokens_and_options_from() {
        let long = "x".repeat(65);
        let msg = menu_err(&format!(
            r#"
            [[node]]
            id = "root"
            prompt = "hi"
            [[node.option]]
            label = "A"
            token = "{long}"
            target = "root"
            "#
        ));
        assert!(msg.contains("invalid callback token"));

        let msg = menu_err(
            r#"
            [[node]]
            id = "root"
            prompt = "hi"
            options_from = "ghost"
            "#,
        );
        assert!(msg.contains("unknown node `ghost`"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = MenuGraph::from_toml(
            r#"
            [[node]]
            id = "root"
            prompt = "hi"
            colour = "blue"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn unknown_state_falls_back_to_root() {
        let menu = MenuGraph::builtin().unwrap();
        assert_eq!(menu.node_or_root("deleted_state").state_id, ROOT_STATE);
    }

    const TWO_NODE_MENU: &str = r#"
[[node]]
id = "root"
prompt = "Hi {name}"

[[node.option]]
label = "Go"
token = "go"
target = "next"

[[node]]
id = "next"
prompt = "There"
options_from = "root"
"#;

    #[test]
    fn loads_menu_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.toml");
        fs::write(&path, TWO_NODE_MENU).unwrap();

        let menu = MenuGraph::load(Some(&path)).unwrap();
        assert_eq!(menu.state_count(), 2);
        assert_eq!(menu.node("next").unwrap().options[0].callback_token, "go");
    }

    #[test]
    fn missing_menu_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        match MenuGraph::load(Some(&path)) {
            Err(Error::Unreadable { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected unreadable error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_menu_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.toml");
        let broken = TWO_NODE_MENU.replace("target = \"next\"", "target = \"nowhere\"");
        fs::write(&path, broken).unwrap();

        assert!(matches!(MenuGraph::load(Some(&path)), Err(Error::Menu(_))));
    }

    #[test]
    fn no_path_loads_builtin() {
        let menu = MenuGraph::load(None).unwrap();
        assert_eq!(menu.state_count(), MenuGraph::builtin().unwrap().state_count());
    }
}
