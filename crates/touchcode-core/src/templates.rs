//! File type registry and boilerplate templates.
//!
//! Maps file extensions to a type tag, display metadata and the
//! starter content a freshly created file receives.

use chrono::Utc;

use crate::model::{File, FileId};
use crate::ValidationError;

/// Tag used for names without a recognised extension.
pub const TEXT_TAG: &str = "txt";

/// Longest accepted file name, in characters.
pub const MAX_FILE_NAME_LEN: usize = 100;

/// Presentation metadata for a type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageInfo {
    /// Language label handed to the editing widget
    pub language: &'static str,
    /// Icon shown in file lists
    pub icon: &'static str,
    /// Accent color
    pub color: &'static str,
}

const REGISTRY: &[(&str, LanguageInfo)] = &[
    ("html", LanguageInfo { language: "html", icon: "🌐", color: "#e34c26" }),
    ("css", LanguageInfo { language: "css", icon: "🎨", color: "#1572b6" }),
    ("js", LanguageInfo { language: "javascript", icon: "📜", color: "#f7df1e" }),
    ("jsx", LanguageInfo { language: "javascript", icon: "⚛️", color: "#61dafb" }),
    ("ts", LanguageInfo { language: "typescript", icon: "📘", color: "#3178c6" }),
    ("tsx", LanguageInfo { language: "typescript", icon: "⚛️", color: "#3178c6" }),
    ("py", LanguageInfo { language: "python", icon: "🐍", color: "#3776ab" }),
    ("md", LanguageInfo { language: "markdown", icon: "📝", color: "#083fa1" }),
    ("json", LanguageInfo { language: "json", icon: "📋", color: "#000000" }),
    ("xml", LanguageInfo { language: "xml", icon: "📄", color: "#e37933" }),
    (TEXT_TAG, LanguageInfo { language: "plaintext", icon: "📄", color: "#666666" }),
];

/// Returns every registered type tag, in display order.
pub fn known_tags() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(tag, _)| *tag)
}

/// Returns the lower-cased text after the last `.`, or an empty string.
pub fn extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Derives the type tag for a file name.
pub fn type_tag(name: &str) -> String {
    let ext = extension(name);
    if REGISTRY.iter().any(|(tag, _)| *tag == ext) {
        ext
    } else {
        TEXT_TAG.to_string()
    }
}

/// Returns display metadata for a tag, falling back to plain text.
pub fn language_info(tag: &str) -> LanguageInfo {
    let lookup = |wanted: &str| {
        REGISTRY
            .iter()
            .find(|(t, _)| *t == wanted)
            .map(|(_, info)| *info)
    };
    lookup(tag)
        .or_else(|| lookup(TEXT_TAG))
        .unwrap_or(LanguageInfo { language: "plaintext", icon: "📄", color: "#666666" })
}

/// Appends `.<tag>` to names that carry no extension.
pub fn resolve_file_name(name: &str, tag: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.{tag}")
    }
}

/// Checks a file name against the naming rules.
pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyFileName);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ValidationError::PathSeparator);
    }
    let len = name.chars().count();
    if len > MAX_FILE_NAME_LEN {
        return Err(ValidationError::FileNameTooLong(len));
    }
    Ok(())
}

/// Creates a file with the boilerplate for `tag`.
///
/// Unknown tags produce an empty file.
pub fn new_file(name: &str, tag: &str) -> File {
    File {
        id: FileId::new(),
        name: name.to_string(),
        content: template_for(tag).to_string(),
        file_type: tag.to_string(),
        last_modified: Utc::now(),
    }
}

/// Returns the starter content for a tag.
pub fn template_for(tag: &str) -> &'static str {
    match tag {
        "html" => HTML_TEMPLATE,
        "css" => CSS_TEMPLATE,
        "js" => JS_TEMPLATE,
        "jsx" => JSX_TEMPLATE,
        "ts" => TS_TEMPLATE,
        "tsx" => TSX_TEMPLATE,
        "py" => PY_TEMPLATE,
        "md" => MD_TEMPLATE,
        _ => "",
    }
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Document</title>
</head>
<body>
    <h1>Hello World!</h1>
</body>
</html>"#;

const CSS_TEMPLATE: &str = r#"/* CSS Styles */
body {
    font-family: Arial, sans-serif;
    margin: 0;
    padding: 20px;
    background-color: #f5f5f5;
}

h1 {
    color: #333;
    text-align: center;
}"#;

const JS_TEMPLATE: &str = r#"// JavaScript
console.log('Hello World!');

function main() {
    // Your code here
}

main();"#;

const JSX_TEMPLATE: &str = r#"import React from 'react';

const Component = () => {
    return (
        <div>
            <h1>Hello React!</h1>
        </div>
    );
};

export default Component;"#;

const TS_TEMPLATE: &str = r#"// TypeScript
interface Person {
    name: string;
    age: number;
}

const person: Person = {
    name: 'John',
    age: 30
};

console.log(person);"#;

const TSX_TEMPLATE: &str = r#"import React from 'react';

interface Props {
    title: string;
}

const Component: React.FC<Props> = ({ title }) => {
    return (
        <div>
            <h1>{title}</h1>
        </div>
    );
};

export default Component;"#;

const PY_TEMPLATE: &str = r#"# Python
def main():
    print("Hello World!")

if __name__ == "__main__":
    main()"#;

const MD_TEMPLATE: &str = r#"# Markdown Document

This is a **markdown** file.

## Features
- Easy to write
- Easy to read
- Supports *formatting*

```javascript
console.log('Code blocks supported!');
```"#;
