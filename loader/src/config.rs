//! Boot configuration file
//!
//! The format is word-oriented: `key=value` pairs and bare flags,
//! with `#` comments and double-quoted values. Keys seen before the
//! first `image=` token are global options; each `image=` opens a new
//! per-image section. Typing a section's label, alias or image path at
//! the prompt selects it.

use crate::error::{Error, Result};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;

/// Keys whose presence alone means something.
const FLAG_KEYS: &[&str] = &["read-only", "read-write", "old-kernel", "pause-after"];

#[derive(Debug, Default)]
struct Section {
    strings: HashMap<String, String>,
    flags: Vec<String>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    fn flag(&self, key: &str) -> bool {
        self.flags.iter().any(|f| f == key)
    }
}

/// Parsed configuration: global options plus the image sections.
#[derive(Debug, Default)]
pub struct Config {
    globals: Section,
    images: Vec<Section>,
}

impl Config {
    /// Parse configuration text.
    ///
    /// Unknown keys are kept (they are simply never asked for); text
    /// that is not key-shaped at all is a parse error.
    pub fn parse(text: &str) -> Result<Config> {
        let mut config = Config::default();
        let mut tokens = Tokenizer::new(text);

        while let Some(token) = tokens.next_token()? {
            match token {
                Token::Flag(name) => {
                    if !FLAG_KEYS.contains(&name.as_str()) {
                        return Err(Error::ConfigInvalid);
                    }
                    config.current().flags.push(name);
                }
                Token::Pair(key, value) => {
                    if key == "image" {
                        let mut section = Section::default();
                        section.strings.insert(key, value);
                        config.images.push(section);
                    } else {
                        config.current().strings.insert(key, value);
                    }
                }
            }
        }

        Ok(config)
    }

    fn current(&mut self) -> &mut Section {
        match self.images.last_mut() {
            Some(section) => section,
            None => &mut self.globals,
        }
    }

    /// Look up a string value: globally, or inside the named section.
    pub fn get_str(&self, label: Option<&str>, key: &str) -> Option<&str> {
        match label {
            None => self.globals.get(key),
            Some(label) => self.find_image(label)?.get(key),
        }
    }

    /// Look up a flag: globally, or inside the named section.
    pub fn get_flag(&self, label: Option<&str>, key: &str) -> bool {
        match label {
            None => self.globals.flag(key),
            Some(label) => self
                .find_image(label)
                .map(|s| s.flag(key))
                .unwrap_or(false),
        }
    }

    /// The image section selected by what the user typed.
    fn find_image(&self, label: &str) -> Option<&Section> {
        self.images.iter().find(|s| {
            s.get("label") == Some(label)
                || s.get("alias") == Some(label)
                || s.get("image") == Some(label)
        })
    }

    /// The image path behind a typed name, when it names a section.
    pub fn image_path(&self, label: &str) -> Option<&str> {
        self.find_image(label)?.get("image")
    }

    /// The image to boot when the user just presses return: the
    /// `default` option if set, else the first image's label (or its
    /// path when it has no label).
    pub fn default_image(&self) -> Option<&str> {
        if let Some(default) = self.globals.get("default") {
            return Some(default);
        }
        let first = self.images.first()?;
        first.get("label").or_else(|| first.get("image"))
    }

    /// Names of all configured images, for the prompt listing.
    pub fn image_names(&self) -> Vec<&str> {
        self.images
            .iter()
            .filter_map(|s| s.get("label").or_else(|| s.get("image")))
            .collect()
    }
}

enum Token {
    Pair(String, String),
    Flag(String),
}

struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            self.rest = self.rest.trim_start();
            if let Some(after) = self.rest.strip_prefix('#') {
                self.rest = match after.find('\n') {
                    Some(nl) => &after[nl + 1..],
                    None => "",
                };
                continue;
            }
            break;
        }

        if self.rest.is_empty() {
            return Ok(None);
        }

        // Key runs to '=', whitespace, or end
        let key_end = self
            .rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(self.rest.len());
        let key = &self.rest[..key_end];
        if key.is_empty() {
            // A bare '=' or stray quote
            return Err(Error::ConfigInvalid);
        }

        let after_key = self.rest[key_end..].trim_start();
        if !after_key.starts_with('=') {
            self.rest = after_key;
            return Ok(Some(Token::Flag(key.to_string())));
        }

        let value_text = after_key[1..].trim_start();
        if let Some(quoted) = value_text.strip_prefix('"') {
            let close = quoted.find('"').ok_or(Error::ConfigInvalid)?;
            self.rest = &quoted[close + 1..];
            return Ok(Some(Token::Pair(
                key.to_string(),
                quoted[..close].to_string(),
            )));
        }

        let value_end = value_text
            .find(char::is_whitespace)
            .unwrap_or(value_text.len());
        let value = &value_text[..value_end];
        if value.is_empty() {
            return Err(Error::ConfigInvalid);
        }
        self.rest = &value_text[value_end..];
        Ok(Some(Token::Pair(key.to_string(), value.to_string())))
    }
}
