//! `.proto` text rendering of resolved file descriptors.
//!
//! The renderer walks a `prost_reflect::FileDescriptor`, so every type
//! reference it prints has been resolved against the pool and is written
//! fully qualified. Output is a pure function of the descriptor.
//!
//! Layout follows `protoc`'s own debug output: syntax, package, imports,
//! options, then messages, enums, services and top-level extensions.

use prost_reflect::{
    Cardinality, EnumDescriptor, ExtensionDescriptor, FieldDescriptor, FileDescriptor, Kind,
    MessageDescriptor, OneofDescriptor, ServiceDescriptor,
};
use prost_types::FileOptions;
use std::collections::HashSet;
use std::fmt::{self, Write};

use crate::MAX_FIELD_NUMBER;

/// Configuration for rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation per nesting level (default: 2 spaces)
    pub indent: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
        }
    }
}

impl RenderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Proto2,
    Proto3,
}

/// Renders resolved descriptors as `.proto` source
#[derive(Debug, Clone, Default)]
pub struct ProtoRenderer {
    config: RenderConfig,
}

impl ProtoRenderer {
    /// Creates a renderer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer with custom configuration
    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render `file` to a string
    pub fn render(&self, file: &FileDescriptor) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_to(file, &mut out);
        out
    }

    /// Render `file` into any formatter sink
    pub fn write_to(&self, file: &FileDescriptor, out: &mut impl Write) -> fmt::Result {
        let proto = file.file_descriptor_proto();
        let syntax = if proto.syntax() == "proto3" {
            Syntax::Proto3
        } else {
            Syntax::Proto2
        };

        let mut w = TextWriter {
            out,
            indent: &self.config.indent,
            depth: 0,
            syntax,
        };
        w.file(file)
    }
}

struct TextWriter<'a, W> {
    out: &'a mut W,
    indent: &'a str,
    depth: usize,
    syntax: Syntax,
}

impl<W: Write> TextWriter<'_, W> {
    fn line(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        for _ in 0..self.depth {
            self.out.write_str(self.indent)?;
        }
        self.out.write_fmt(args)?;
        self.out.write_char('\n')
    }

    fn blank(&mut self) -> fmt::Result {
        self.out.write_char('\n')
    }

    fn open(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        self.line(format_args!("{} {{", args))?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self) -> fmt::Result {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("}}"))
    }

    fn file(&mut self, file: &FileDescriptor) -> fmt::Result {
        let proto = file.file_descriptor_proto();
        let syntax = match self.syntax {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        };
        self.line(format_args!("syntax = \"{}\";", syntax))?;
        self.blank()?;

        if !file.package_name().is_empty() {
            self.line(format_args!("package {};", file.package_name()))?;
            self.blank()?;
        }

        if !proto.dependency.is_empty() {
            let public: HashSet<i32> = proto.public_dependency.iter().copied().collect();
            let weak: HashSet<i32> = proto.weak_dependency.iter().copied().collect();
            for (i, dependency) in proto.dependency.iter().enumerate() {
                let modifier = if public.contains(&(i as i32)) {
                    "public "
                } else if weak.contains(&(i as i32)) {
                    "weak "
                } else {
                    ""
                };
                self.line(format_args!("import {}\"{}\";", modifier, dependency))?;
            }
            self.blank()?;
        }

        if let Some(options) = &proto.options {
            self.file_options(options)?;
        }

        for message in file.messages() {
            self.message(&message)?;
            self.blank()?;
        }
        for enum_type in file.enums() {
            self.enumeration(&enum_type)?;
            self.blank()?;
        }
        for service in file.services() {
            self.service(&service)?;
            self.blank()?;
        }
        self.extensions(file.extensions())
    }

    fn file_options(&mut self, options: &FileOptions) -> fmt::Result {
        let strings = [
            ("java_package", options.java_package.as_deref()),
            ("java_outer_classname", options.java_outer_classname.as_deref()),
            ("go_package", options.go_package.as_deref()),
            ("objc_class_prefix", options.objc_class_prefix.as_deref()),
            ("csharp_namespace", options.csharp_namespace.as_deref()),
            ("swift_prefix", options.swift_prefix.as_deref()),
            ("php_class_prefix", options.php_class_prefix.as_deref()),
            ("php_namespace", options.php_namespace.as_deref()),
            ("php_metadata_namespace", options.php_metadata_namespace.as_deref()),
            ("ruby_package", options.ruby_package.as_deref()),
        ];
        let flags = [
            ("java_multiple_files", options.java_multiple_files),
            ("java_string_check_utf8", options.java_string_check_utf8),
            ("cc_enable_arenas", options.cc_enable_arenas),
            ("deprecated", options.deprecated),
        ];

        let mut wrote = false;
        for (name, value) in strings {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                self.line(format_args!("option {} = {};", name, quote(value)))?;
                wrote = true;
            }
        }
        for (name, value) in flags {
            if let Some(value) = value {
                self.line(format_args!("option {} = {};", name, value))?;
                wrote = true;
            }
        }
        if let Some(mode) = options.optimize_for {
            let mode = match mode {
                2 => "CODE_SIZE",
                3 => "LITE_RUNTIME",
                _ => "SPEED",
            };
            self.line(format_args!("option optimize_for = {};", mode))?;
            wrote = true;
        }

        if wrote {
            self.blank()?;
        }
        Ok(())
    }

    fn message(&mut self, message: &MessageDescriptor) -> fmt::Result {
        self.open(format_args!("message {}", message.name()))?;
        let proto = message.descriptor_proto();

        if !proto.reserved_range.is_empty() {
            let ranges: Vec<String> = proto
                .reserved_range
                .iter()
                .map(|r| range_text(r.start(), r.end().saturating_sub(1)))
                .collect();
            self.line(format_args!("reserved {};", ranges.join(", ")))?;
        }
        if !proto.reserved_name.is_empty() {
            let names: Vec<String> = proto.reserved_name.iter().map(|n| quote(n)).collect();
            self.line(format_args!("reserved {};", names.join(", ")))?;
        }

        for nested in message.child_messages().filter(|m| !m.is_map_entry()) {
            self.message(&nested)?;
        }
        for enum_type in message.child_enums() {
            self.enumeration(&enum_type)?;
        }

        let mut written_oneofs = HashSet::new();
        for field in message.fields() {
            match real_oneof(&field) {
                Some(oneof) => {
                    if written_oneofs.insert(oneof.name().to_string()) {
                        self.oneof(&oneof)?;
                    }
                }
                None => self.field(&field)?,
            }
        }

        self.extensions(message.child_extensions())?;

        for range in &proto.extension_range {
            self.line(format_args!(
                "extensions {};",
                range_text(range.start(), range.end().saturating_sub(1))
            ))?;
        }

        self.close()
    }

    fn oneof(&mut self, oneof: &OneofDescriptor) -> fmt::Result {
        self.open(format_args!("oneof {}", oneof.name()))?;
        for field in oneof.fields() {
            let options = self.field_options(&field);
            self.line(format_args!(
                "{} {} = {}{};",
                type_name(&field.kind()),
                field.name(),
                field.number(),
                options
            ))?;
        }
        self.close()
    }

    fn field(&mut self, field: &FieldDescriptor) -> fmt::Result {
        let options = self.field_options(field);

        if field.is_map() {
            if let Kind::Message(entry) = field.kind() {
                return self.line(format_args!(
                    "map<{}, {}> {} = {}{};",
                    type_name(&entry.map_entry_key_field().kind()),
                    type_name(&entry.map_entry_value_field().kind()),
                    field.name(),
                    field.number(),
                    options
                ));
            }
        }

        let proto3_optional = field.field_descriptor_proto().proto3_optional();
        let label = self.label(field.cardinality(), proto3_optional);
        self.line(format_args!(
            "{}{} {} = {}{};",
            label,
            type_name(&field.kind()),
            field.name(),
            field.number(),
            options
        ))
    }

    fn label(&self, cardinality: Cardinality, proto3_optional: bool) -> &'static str {
        match cardinality {
            Cardinality::Repeated => "repeated ",
            Cardinality::Required => "required ",
            Cardinality::Optional if self.syntax == Syntax::Proto2 || proto3_optional => {
                "optional "
            }
            Cardinality::Optional => "",
        }
    }

    fn field_options(&self, field: &FieldDescriptor) -> String {
        let proto = field.field_descriptor_proto();
        let mut options = Vec::new();

        if let Some(default) = &proto.default_value {
            let value = match field.kind() {
                Kind::String | Kind::Bytes => quote(default),
                _ => default.clone(),
            };
            options.push(format!("default = {}", value));
        }

        if let Some(json_name) = &proto.json_name {
            if *json_name != lower_camel(field.name()) {
                options.push(format!("json_name = {}", quote(json_name)));
            }
        }

        if let Some(field_options) = &proto.options {
            if let Some(packed) = field_options.packed {
                options.push(format!("packed = {}", packed));
            }
            if field_options.deprecated() {
                options.push("deprecated = true".to_string());
            }
        }

        if options.is_empty() {
            String::new()
        } else {
            format!(" [{}]", options.join(", "))
        }
    }

    fn enumeration(&mut self, enum_type: &EnumDescriptor) -> fmt::Result {
        self.open(format_args!("enum {}", enum_type.name()))?;
        let proto = enum_type.enum_descriptor_proto();

        if proto.options.as_ref().is_some_and(|o| o.allow_alias()) {
            self.line(format_args!("option allow_alias = true;"))?;
        }
        if !proto.reserved_range.is_empty() {
            // Enum reserved ranges are inclusive on both ends
            let ranges: Vec<String> = proto
                .reserved_range
                .iter()
                .map(|r| range_text(r.start(), r.end()))
                .collect();
            self.line(format_args!("reserved {};", ranges.join(", ")))?;
        }
        if !proto.reserved_name.is_empty() {
            let names: Vec<String> = proto.reserved_name.iter().map(|n| quote(n)).collect();
            self.line(format_args!("reserved {};", names.join(", ")))?;
        }

        for value in &proto.value {
            let deprecated = value.options.as_ref().is_some_and(|o| o.deprecated());
            self.line(format_args!(
                "{} = {}{};",
                value.name(),
                value.number(),
                if deprecated { " [deprecated = true]" } else { "" }
            ))?;
        }

        self.close()
    }

    fn service(&mut self, service: &ServiceDescriptor) -> fmt::Result {
        self.open(format_args!("service {}", service.name()))?;
        for method in service.methods() {
            let stream = |streaming: bool| if streaming { "stream " } else { "" };
            self.line(format_args!(
                "rpc {}({}.{}) returns ({}.{});",
                method.name(),
                stream(method.is_client_streaming()),
                method.input().full_name(),
                stream(method.is_server_streaming()),
                method.output().full_name()
            ))?;
        }
        self.close()
    }

    fn extensions(&mut self, extensions: impl Iterator<Item = ExtensionDescriptor>) -> fmt::Result {
        for extension in extensions {
            self.open(format_args!(
                "extend .{}",
                extension.containing_message().full_name()
            ))?;
            let label = self.label(extension.cardinality(), false);
            self.line(format_args!(
                "{}{} {} = {};",
                label,
                type_name(&extension.kind()),
                extension.name(),
                extension.number()
            ))?;
            self.close()?;
        }
        Ok(())
    }
}

/// The oneof a field belongs to, unless it is a proto3 `optional` wrapper
fn real_oneof(field: &FieldDescriptor) -> Option<OneofDescriptor> {
    if field.field_descriptor_proto().proto3_optional() {
        return None;
    }
    field.containing_oneof()
}

fn type_name(kind: &Kind) -> String {
    let scalar = match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(message) => return format!(".{}", message.full_name()),
        Kind::Enum(enum_type) => return format!(".{}", enum_type.full_name()),
    };
    scalar.to_string()
}

/// `start to end` with `end` inclusive; the field-number ceiling prints as `max`
fn range_text(start: i32, end: i32) -> String {
    if start == end {
        start.to_string()
    } else if end >= MAX_FIELD_NUMBER as i32 || end == i32::MAX {
        format!("{} to max", start)
    } else {
        format!("{} to {}", start, end)
    }
}

/// Double-quoted string literal with C-style escapes
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_ascii_control() => {
                let _ = write!(quoted, "\\{:03o}", c as u32);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// The json_name protoc derives from a field name
fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use prost_reflect::DescriptorPool;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, MessageOptions, MethodDescriptorProto, OneofDescriptorProto,
        ServiceDescriptorProto,
    };

    fn field(name: &str, number: i32, label: Label, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(label as i32),
            r#type: Some(ty as i32),
            ..Default::default()
        }
    }

    fn typed(mut f: FieldDescriptorProto, type_name: &str) -> FieldDescriptorProto {
        f.type_name = Some(type_name.to_string());
        f
    }

    fn sample() -> FileDescriptorProto {
        let mut value = field("value", 3, Label::Optional, Type::Int64);
        value.oneof_index = Some(0);
        let mut text = field("text", 4, Label::Optional, Type::String);
        text.oneof_index = Some(0);
        let mut nick = field("nick", 5, Label::Optional, Type::String);
        nick.oneof_index = Some(1);
        nick.proto3_optional = Some(true);

        let entry = DescriptorProto {
            name: Some("LabelsEntry".to_string()),
            field: vec![
                field("key", 1, Label::Optional, Type::String),
                field("value", 2, Label::Optional, Type::String),
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        FileDescriptorProto {
            name: Some("shop/item.proto".to_string()),
            package: Some("shop".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Item".to_string()),
                field: vec![
                    field("id", 1, Label::Optional, Type::Uint64),
                    typed(field("state", 2, Label::Optional, Type::Enum), ".shop.State"),
                    value,
                    text,
                    nick,
                    typed(
                        field("labels", 6, Label::Repeated, Type::Message),
                        ".shop.Item.LabelsEntry",
                    ),
                ],
                nested_type: vec![entry],
                oneof_decl: vec![
                    OneofDescriptorProto {
                        name: Some("payload".to_string()),
                        ..Default::default()
                    },
                    OneofDescriptorProto {
                        name: Some("_nick".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            enum_type: vec![EnumDescriptorProto {
                name: Some("State".to_string()),
                value: vec![
                    EnumValueDescriptorProto {
                        name: Some("STATE_UNKNOWN".to_string()),
                        number: Some(0),
                        ..Default::default()
                    },
                    EnumValueDescriptorProto {
                        name: Some("STATE_READY".to_string()),
                        number: Some(1),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            service: vec![ServiceDescriptorProto {
                name: Some("Catalog".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("Watch".to_string()),
                    input_type: Some(".shop.Item".to_string()),
                    output_type: Some(".shop.Item".to_string()),
                    server_streaming: Some(true),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn resolve(proto: FileDescriptorProto) -> FileDescriptor {
        let name = proto.name().to_string();
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_proto(proto).unwrap();
        pool.get_file_by_name(&name).unwrap()
    }

    #[test]
    fn test_render_proto3_file() {
        let file = resolve(sample());
        let expected = r#"syntax = "proto3";

package shop;

message Item {
  uint64 id = 1;
  .shop.State state = 2;
  oneof payload {
    int64 value = 3;
    string text = 4;
  }
  optional string nick = 5;
  map<string, string> labels = 6;
}

enum State {
  STATE_UNKNOWN = 0;
  STATE_READY = 1;
}

service Catalog {
  rpc Watch(.shop.Item) returns (stream .shop.Item);
}

"#;
        assert_eq!(ProtoRenderer::new().render(&file), expected);
    }

    #[test]
    fn test_render_proto2_labels_and_defaults() {
        let mut count = field("count", 1, Label::Optional, Type::Int32);
        count.default_value = Some("7".to_string());
        let mut name = field("name", 2, Label::Required, Type::String);
        name.default_value = Some("a\"b".to_string());

        let proto = FileDescriptorProto {
            name: Some("legacy.proto".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Old".to_string()),
                field: vec![count, name, field("tags", 3, Label::Repeated, Type::String)],
                reserved_name: vec!["gone".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let text = ProtoRenderer::new().render(&resolve(proto));
        assert!(text.starts_with("syntax = \"proto2\";\n\nmessage Old {\n"));
        assert!(text.contains("  reserved \"gone\";\n"));
        assert!(text.contains("  optional int32 count = 1 [default = 7];\n"));
        assert!(text.contains("  required string name = 2 [default = \"a\\\"b\"];\n"));
        assert!(text.contains("  repeated string tags = 3;\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let file = resolve(sample());
        let renderer = ProtoRenderer::with_config(RenderConfig::new().indent("\t"));
        assert_eq!(renderer.render(&file), renderer.render(&file));
        assert!(renderer.render(&file).contains("\tuint64 id = 1;"));
    }

    #[test]
    fn test_render_reserved_range_at_i32_min() {
        let proto = FileDescriptorProto {
            name: Some("odd.proto".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Odd".to_string()),
                reserved_range: vec![prost_types::descriptor_proto::ReservedRange {
                    start: Some(i32::MIN),
                    end: Some(i32::MIN),
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let text = ProtoRenderer::new().render(&resolve(proto));
        assert!(text.contains("reserved -2147483648;"));
    }

    #[test]
    fn test_range_text() {
        assert_eq!(range_text(5, 5), "5");
        assert_eq!(range_text(1, 9), "1 to 9");
        assert_eq!(range_text(1000, MAX_FIELD_NUMBER as i32), "1000 to max");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a\\b\"c\n"), "\"a\\\\b\\\"c\\n\"");
        assert_eq!(quote("\u{1}"), "\"\\001\"");
    }

    #[test]
    fn test_lower_camel() {
        assert_eq!(lower_camel("hello_world"), "helloWorld");
        assert_eq!(lower_camel("simple"), "simple");
    }
}
