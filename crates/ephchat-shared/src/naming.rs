//! Display name <-> thread id mapping.
//!
//! A display name becomes a thread id by trimming it, lowercasing it and
//! collapsing every whitespace run into a single [`THREAD_SEPARATOR`]. The
//! inverse turns separators back into spaces and capitalizes each word, so
//! `jan_novak` reads as `Jan Novak`.

use crate::constants::THREAD_SEPARATOR;

/// `"Jan  Novák "` -> `"jan_novák"`.
pub fn display_name_to_thread_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for (i, word) in name.split_whitespace().enumerate() {
        if i > 0 {
            id.push(THREAD_SEPARATOR);
        }
        id.push_str(&word.to_lowercase());
    }
    id
}

/// `"jan_novak"` -> `"Jan Novak"`.
pub fn thread_id_to_display_label(id: &str) -> String {
    id.split(THREAD_SEPARATOR)
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
