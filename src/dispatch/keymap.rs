use crate::controller::{Button, UnknownButton};
use crate::forwarding::{CommandToken, InvalidToken};
use crate::lights::Light;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// What a button press does
///
/// In config files an action is a string: `light1` / `light2` toggle a light,
/// anything else is a keycode token such as `KEYCODE_HOME`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Action {
    Key(CommandToken),
    ToggleLight(Light),
}

impl TryFrom<String> for Action {
    type Error = InvalidToken;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light1" => Ok(Action::ToggleLight(Light::Light1)),
            "light2" => Ok(Action::ToggleLight(Light::Light2)),
            _ => CommandToken::new(value.trim()).map(Action::Key),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Key(token) => write!(f, "{}", token),
            Action::ToggleLight(light) => write!(f, "toggle {}", light),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keymap {
    actions: HashMap<Button, Action>,
}

impl Keymap {
    /// Apply per-button overrides keyed by button name
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Action>) -> Result<Self, UnknownButton> {
        for (name, action) in overrides {
            let button: Button = name.parse()?;
            self.actions.insert(button, action.clone());
        }
        Ok(self)
    }

    pub fn action(&self, button: Button) -> Option<&Action> {
        self.actions.get(&button)
    }
}

impl Default for Keymap {
    fn default() -> Self {
        let key = |name: &str| CommandToken::new(name).map(Action::Key);
        let keycodes = [
            (Button::B, "KEYCODE_BACK"),
            (Button::Select, "KEYCODE_MENU"),
            (Button::Start, "KEYCODE_TV_POWER"),
            (Button::Up, "KEYCODE_DPAD_UP"),
            (Button::Down, "KEYCODE_DPAD_DOWN"),
            (Button::Left, "KEYCODE_DPAD_LEFT"),
            (Button::Right, "KEYCODE_DPAD_RIGHT"),
            (Button::A, "KEYCODE_ENTER"),
            (Button::L, "KEYCODE_PAGE_UP"),
            (Button::R, "KEYCODE_PAGE_DOWN"),
        ];

        let mut actions: HashMap<Button, Action> = keycodes
            .into_iter()
            .filter_map(|(button, name)| key(name).ok().map(|action| (button, action)))
            .collect();
        actions.insert(Button::X, Action::ToggleLight(Light::Light1));
        actions.insert(Button::Y, Action::ToggleLight(Light::Light2));
        Self { actions }
    }
}
