use evdev::KeyCode;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Таблица имён клавиш конфигурации -> evdev коды.
/// Имена нормализуются в нижний регистр; синонимы (escape/esc, return/enter) ведут на один код.
static KEY_TABLE: Lazy<HashMap<&'static str, KeyCode>> = Lazy::new(|| {
    let letters = [
        ("a", KeyCode::KEY_A), ("b", KeyCode::KEY_B), ("c", KeyCode::KEY_C), ("d", KeyCode::KEY_D),
        ("e", KeyCode::KEY_E), ("f", KeyCode::KEY_F), ("g", KeyCode::KEY_G), ("h", KeyCode::KEY_H),
        ("i", KeyCode::KEY_I), ("j", KeyCode::KEY_J), ("k", KeyCode::KEY_K), ("l", KeyCode::KEY_L),
        ("m", KeyCode::KEY_M), ("n", KeyCode::KEY_N), ("o", KeyCode::KEY_O), ("p", KeyCode::KEY_P),
        ("q", KeyCode::KEY_Q), ("r", KeyCode::KEY_R), ("s", KeyCode::KEY_S), ("t", KeyCode::KEY_T),
        ("u", KeyCode::KEY_U), ("v", KeyCode::KEY_V), ("w", KeyCode::KEY_W), ("x", KeyCode::KEY_X),
        ("y", KeyCode::KEY_Y), ("z", KeyCode::KEY_Z),
    ];

    let digits = [
        ("0", KeyCode::KEY_0), ("1", KeyCode::KEY_1), ("2", KeyCode::KEY_2), ("3", KeyCode::KEY_3),
        ("4", KeyCode::KEY_4), ("5", KeyCode::KEY_5), ("6", KeyCode::KEY_6), ("7", KeyCode::KEY_7),
        ("8", KeyCode::KEY_8), ("9", KeyCode::KEY_9),
    ];

    let function_keys = [
        ("f1", KeyCode::KEY_F1), ("f2", KeyCode::KEY_F2), ("f3", KeyCode::KEY_F3),
        ("f4", KeyCode::KEY_F4), ("f5", KeyCode::KEY_F5), ("f6", KeyCode::KEY_F6),
        ("f7", KeyCode::KEY_F7), ("f8", KeyCode::KEY_F8), ("f9", KeyCode::KEY_F9),
        ("f10", KeyCode::KEY_F10), ("f11", KeyCode::KEY_F11), ("f12", KeyCode::KEY_F12),
    ];

    let special = [
        ("esc", KeyCode::KEY_ESC), ("escape", KeyCode::KEY_ESC),
        ("enter", KeyCode::KEY_ENTER), ("return", KeyCode::KEY_ENTER),
        ("tab", KeyCode::KEY_TAB),
        ("space", KeyCode::KEY_SPACE),
        ("backspace", KeyCode::KEY_BACKSPACE),
        ("delete", KeyCode::KEY_DELETE), ("del", KeyCode::KEY_DELETE),
        ("insert", KeyCode::KEY_INSERT),
        ("home", KeyCode::KEY_HOME), ("end", KeyCode::KEY_END),
        ("pageup", KeyCode::KEY_PAGEUP), ("pagedown", KeyCode::KEY_PAGEDOWN),
        ("up", KeyCode::KEY_UP), ("down", KeyCode::KEY_DOWN),
        ("left", KeyCode::KEY_LEFT), ("right", KeyCode::KEY_RIGHT),
        ("shift", KeyCode::KEY_LEFTSHIFT), ("rshift", KeyCode::KEY_RIGHTSHIFT),
        ("ctrl", KeyCode::KEY_LEFTCTRL), ("rctrl", KeyCode::KEY_RIGHTCTRL),
        ("alt", KeyCode::KEY_LEFTALT), ("ralt", KeyCode::KEY_RIGHTALT),
        ("super", KeyCode::KEY_LEFTMETA),
        ("capslock", KeyCode::KEY_CAPSLOCK),
    ];

    let punctuation = [
        ("minus", KeyCode::KEY_MINUS), ("-", KeyCode::KEY_MINUS),
        ("equal", KeyCode::KEY_EQUAL), ("=", KeyCode::KEY_EQUAL),
        ("leftbrace", KeyCode::KEY_LEFTBRACE), ("[", KeyCode::KEY_LEFTBRACE),
        ("rightbrace", KeyCode::KEY_RIGHTBRACE), ("]", KeyCode::KEY_RIGHTBRACE),
        ("backslash", KeyCode::KEY_BACKSLASH), ("\\", KeyCode::KEY_BACKSLASH),
        ("semicolon", KeyCode::KEY_SEMICOLON), (";", KeyCode::KEY_SEMICOLON),
        ("apostrophe", KeyCode::KEY_APOSTROPHE), ("'", KeyCode::KEY_APOSTROPHE),
        ("grave", KeyCode::KEY_GRAVE), ("`", KeyCode::KEY_GRAVE),
        ("comma", KeyCode::KEY_COMMA), (",", KeyCode::KEY_COMMA),
        ("dot", KeyCode::KEY_DOT), (".", KeyCode::KEY_DOT),
        ("slash", KeyCode::KEY_SLASH), ("/", KeyCode::KEY_SLASH),
    ];

    letters
        .into_iter()
        .chain(digits)
        .chain(function_keys)
        .chain(special)
        .chain(punctuation)
        .collect()
});

/// Преобразование имён клавиш в evdev коды
pub struct KeyNames;

impl KeyNames {
    /// Получить evdev код клавиши по её имени (без учёта регистра)
    pub fn resolve(key_name: &str) -> Option<KeyCode> {
        let normalized = key_name.trim().to_lowercase();
        KEY_TABLE.get(normalized.as_str()).copied()
    }

    /// Raw-код для записи в uinput
    pub fn code(key_name: &str) -> Option<u16> {
        Self::resolve(key_name).map(|key| key.code())
    }

    pub fn is_known(key_name: &str) -> bool {
        Self::resolve(key_name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(KeyNames::resolve("A"), Some(KeyCode::KEY_A));
        assert_eq!(KeyNames::resolve(" Space "), Some(KeyCode::KEY_SPACE));
        assert_eq!(KeyNames::resolve("F9"), Some(KeyCode::KEY_F9));
    }

    #[test]
    fn test_aliases_share_code() {
        assert_eq!(KeyNames::code("esc"), KeyNames::code("ESCAPE"));
        assert_eq!(KeyNames::code("enter"), KeyNames::code("return"));
        assert_eq!(KeyNames::code("\\"), KeyNames::code("backslash"));
    }

    #[test]
    fn test_unknown_key() {
        assert!(!KeyNames::is_known("hyper"));
        assert!(!KeyNames::is_known(""));
    }
}
