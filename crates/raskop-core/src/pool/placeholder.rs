//! Stand-in files for imports that no input provides.
//!
//! A placeholder carries only the missing file's name. When files importing
//! it refer to types that nothing collected defines, those types are
//! declared as empty messages (or single-value enums) in synthetic files that
//! the placeholder imports publicly, so the importers still build.

use prost_types::descriptor_proto::ExtensionRange;
use prost_types::field_descriptor_proto::Type;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::MAX_FIELD_NUMBER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TypeKind {
    Message,
    Enum,
}

#[derive(Debug, Clone)]
struct TypeRef {
    /// Fully qualified, without the leading dot
    full_name: String,
    kind: TypeKind,
    /// Used as an extendee, so it needs an extension range
    extendable: bool,
}

#[derive(Debug, Clone, Copy)]
struct PlannedType {
    kind: TypeKind,
    extendable: bool,
}

/// Which unresolved types get declared, and which missing files expose them.
#[derive(Debug, Default)]
pub(super) struct PlaceholderPlan {
    /// Synthetic type files, each declared once and shared by every placeholder
    type_files: Vec<FileDescriptorProto>,
    /// missing file -> indices into `type_files` it imports publicly
    exposed: BTreeMap<String, BTreeSet<usize>>,
    type_count: usize,
}

impl PlaceholderPlan {
    /// Plan placeholders for `files`, given in ingestion order.
    ///
    /// Every unresolved type is declared exactly once. A type whose enclosing
    /// name is itself an unresolved message is nested inside it. Each missing
    /// import of a file that references a type re-exports the file declaring it.
    pub(super) fn new(files: &[FileDescriptorProto], is_present: impl Fn(&str) -> bool) -> Self {
        let mut defined = HashSet::new();
        for file in files {
            collect_defined(file, &mut defined);
        }

        let mut planned: BTreeMap<String, PlannedType> = BTreeMap::new();
        let mut users: Vec<(Vec<&str>, Vec<String>)> = Vec::new();
        for file in files {
            let missing: Vec<&str> = file
                .dependency
                .iter()
                .map(String::as_str)
                .filter(|dep| !is_present(dep))
                .collect();
            if missing.is_empty() {
                continue;
            }

            let mut referenced = Vec::new();
            for reference in referenced_types(file) {
                if defined.contains(&reference.full_name) {
                    continue;
                }
                let extendable = reference.extendable;
                planned
                    .entry(reference.full_name.clone())
                    .and_modify(|existing| existing.extendable |= extendable)
                    .or_insert(PlannedType {
                        kind: reference.kind,
                        extendable,
                    });
                referenced.push(reference.full_name);
            }
            users.push((missing, referenced));
        }

        add_enclosing_messages(&mut planned);

        let mut plan = Self {
            type_count: planned.len(),
            ..Self::default()
        };

        // Group the outermost types by package and the syntax they need
        let mut groups: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        for name in planned.keys() {
            if enclosing_message(name, &planned).is_some() {
                continue;
            }
            let package = name.rsplit_once('.').map_or("", |(package, _)| package);
            let syntax = if needs_proto2(name, &planned) {
                "proto2"
            } else {
                "proto3"
            };
            groups.entry((package, syntax)).or_default().push(name.as_str());
        }

        let mut file_of_root: HashMap<&str, usize> = HashMap::new();
        for ((package, syntax), roots) in groups {
            let index = plan.type_files.len();
            let mut file = FileDescriptorProto {
                name: Some(format!(
                    "placeholder/{}.{}.proto",
                    if package.is_empty() { "_" } else { package },
                    syntax
                )),
                package: (!package.is_empty()).then(|| package.to_string()),
                syntax: Some(syntax.to_string()),
                ..Default::default()
            };
            for root in roots {
                match planned[root].kind {
                    TypeKind::Message => file.message_type.push(build_message(root, &planned)),
                    TypeKind::Enum => file.enum_type.push(build_enum(root)),
                }
                file_of_root.insert(root, index);
            }
            plan.type_files.push(file);
        }

        for (missing, referenced) in users {
            let indices: BTreeSet<usize> = referenced
                .iter()
                .filter_map(|name| file_of_root.get(outermost(name, &planned)).copied())
                .collect();
            for dep in missing {
                plan.exposed
                    .entry(dep.to_string())
                    .or_default()
                    .extend(indices.iter().copied());
            }
        }
        plan
    }

    /// The files to add for `missing`: the synthetic type files it exposes,
    /// then the placeholder itself. Type files may already be in the pool.
    pub(super) fn files_for(&self, missing: &str) -> Vec<FileDescriptorProto> {
        let mut files: Vec<FileDescriptorProto> = self
            .exposed
            .get(missing)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.type_files.get(index).cloned())
            .collect();

        let dependency: Vec<String> = files.iter().map(|f| f.name().to_string()).collect();
        files.push(FileDescriptorProto {
            name: Some(missing.to_string()),
            public_dependency: (0..dependency.len() as i32).collect(),
            dependency,
            ..Default::default()
        });
        files
    }

    /// Number of types declared across all placeholders
    pub(super) fn type_count(&self) -> usize {
        self.type_count
    }
}

fn parent_name(full_name: &str) -> Option<&str> {
    full_name.rsplit_once('.').map(|(parent, _)| parent)
}

fn short_name(full_name: &str) -> &str {
    full_name.rsplit_once('.').map_or(full_name, |(_, name)| name)
}

fn is_planned_message(name: &str, planned: &BTreeMap<String, PlannedType>) -> bool {
    planned.get(name).is_some_and(|ty| ty.kind == TypeKind::Message)
}

/// The planned message directly enclosing `name`, if any
fn enclosing_message<'p>(name: &'p str, planned: &BTreeMap<String, PlannedType>) -> Option<&'p str> {
    parent_name(name).filter(|parent| is_planned_message(parent, planned))
}

fn outermost<'p>(mut name: &'p str, planned: &BTreeMap<String, PlannedType>) -> &'p str {
    while let Some(parent) = enclosing_message(name, planned) {
        name = parent;
    }
    name
}

/// Once any prefix of a name is a planned message, every longer prefix must
/// be a message too, since a package cannot live inside a message.
fn add_enclosing_messages(planned: &mut BTreeMap<String, PlannedType>) {
    let mut missing = Vec::new();
    for name in planned.keys() {
        let prefixes: Vec<&str> = name
            .match_indices('.')
            .map(|(i, _)| &name[..i])
            .collect();
        if let Some(first) = prefixes.iter().position(|p| is_planned_message(p, planned)) {
            missing.extend(
                prefixes[first + 1..]
                    .iter()
                    .filter(|p| !planned.contains_key(**p))
                    .map(|p| p.to_string()),
            );
        }
    }
    for name in missing {
        planned.entry(name).or_insert(PlannedType {
            kind: TypeKind::Message,
            extendable: false,
        });
    }
}

fn nested<'p>(parent: &str, planned: &'p BTreeMap<String, PlannedType>) -> Vec<(&'p str, PlannedType)> {
    planned
        .iter()
        .filter(|(name, _)| parent_name(name) == Some(parent))
        .map(|(name, ty)| (name.as_str(), *ty))
        .collect()
}

/// Extension ranges are proto2 only
fn needs_proto2(name: &str, planned: &BTreeMap<String, PlannedType>) -> bool {
    let Some(ty) = planned.get(name) else {
        return false;
    };
    ty.kind == TypeKind::Message
        && (ty.extendable
            || nested(name, planned)
                .into_iter()
                .any(|(child, _)| needs_proto2(child, planned)))
}

fn build_message(name: &str, planned: &BTreeMap<String, PlannedType>) -> DescriptorProto {
    let mut message = DescriptorProto {
        name: Some(short_name(name).to_string()),
        ..Default::default()
    };
    if planned.get(name).is_some_and(|ty| ty.extendable) {
        message.extension_range.push(ExtensionRange {
            start: Some(1),
            end: Some(MAX_FIELD_NUMBER as i32 + 1),
            ..Default::default()
        });
    }
    for (child, ty) in nested(name, planned) {
        match ty.kind {
            TypeKind::Message => message.nested_type.push(build_message(child, planned)),
            TypeKind::Enum => message.enum_type.push(build_enum(child)),
        }
    }
    message
}

fn build_enum(name: &str) -> EnumDescriptorProto {
    let name = short_name(name);
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: vec![EnumValueDescriptorProto {
            name: Some(format!("{}_PLACEHOLDER", name.to_ascii_uppercase())),
            number: Some(0),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn collect_defined(file: &FileDescriptorProto, defined: &mut HashSet<String>) {
    fn qualify(scope: &str, name: &str) -> String {
        if scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", scope, name)
        }
    }

    fn walk(scope: &str, message: &DescriptorProto, defined: &mut HashSet<String>) {
        let full_name = qualify(scope, message.name());
        for nested in &message.nested_type {
            walk(&full_name, nested, defined);
        }
        for enum_type in &message.enum_type {
            defined.insert(qualify(&full_name, enum_type.name()));
        }
        defined.insert(full_name);
    }

    let package = file.package();
    for message in &file.message_type {
        walk(package, message, defined);
    }
    for enum_type in &file.enum_type {
        defined.insert(qualify(package, enum_type.name()));
    }
}

fn referenced_types(file: &FileDescriptorProto) -> Vec<TypeRef> {
    fn absolute(name: &str) -> Option<&str> {
        name.strip_prefix('.').filter(|name| !name.is_empty())
    }

    fn field_refs(field: &FieldDescriptorProto, out: &mut Vec<TypeRef>) {
        if let Some(type_name) = field.type_name.as_deref().and_then(absolute) {
            let kind = if field.r#type == Some(Type::Enum as i32) {
                TypeKind::Enum
            } else {
                TypeKind::Message
            };
            out.push(TypeRef {
                full_name: type_name.to_string(),
                kind,
                extendable: false,
            });
        }
        if let Some(extendee) = field.extendee.as_deref().and_then(absolute) {
            out.push(TypeRef {
                full_name: extendee.to_string(),
                kind: TypeKind::Message,
                extendable: true,
            });
        }
    }

    fn walk(message: &DescriptorProto, out: &mut Vec<TypeRef>) {
        for field in message.field.iter().chain(&message.extension) {
            field_refs(field, out);
        }
        for nested in &message.nested_type {
            walk(nested, out);
        }
    }

    let mut out = Vec::new();
    for message in &file.message_type {
        walk(message, &mut out);
    }
    for extension in &file.extension {
        field_refs(extension, &mut out);
    }
    for method in file.service.iter().flat_map(|service| &service.method) {
        for type_name in [method.input_type.as_deref(), method.output_type.as_deref()] {
            if let Some(type_name) = type_name.and_then(absolute) {
                out.push(TypeRef {
                    full_name: type_name.to_string(),
                    kind: TypeKind::Message,
                    extendable: false,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: Type, type_name: &str) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(1),
            r#type: Some(ty as i32),
            type_name: Some(type_name.to_string()),
            ..Default::default()
        }
    }

    fn importer(name: &str, deps: &[&str], fields: Vec<FieldDescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some("app".to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            message_type: vec![DescriptorProto {
                name: Some("Holder".to_string()),
                field: fields,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_defined_types_are_not_planned() {
        let files = [importer(
            "a.proto",
            &["gone.proto"],
            vec![field("self_ref", Type::Message, ".app.Holder")],
        )];
        let plan = PlaceholderPlan::new(&files, |name| name == "a.proto");
        assert_eq!(plan.type_count(), 0);

        let placeholder = plan.files_for("gone.proto");
        assert_eq!(placeholder.len(), 1);
        assert_eq!(placeholder[0].name(), "gone.proto");
        assert!(placeholder[0].message_type.is_empty());
        assert!(placeholder[0].dependency.is_empty());
    }

    #[test]
    fn test_types_grouped_by_package() {
        let files = [importer(
            "a.proto",
            &["gone.proto", "also_gone.proto"],
            vec![
                field("thing", Type::Message, ".ext.Thing"),
                field("color", Type::Enum, ".ext.Color"),
                field("other", Type::Message, ".other.pkg.Widget"),
            ],
        )];
        let plan = PlaceholderPlan::new(&files, |name| name == "a.proto");
        assert_eq!(plan.type_count(), 3);

        let files = plan.files_for("gone.proto");
        assert_eq!(files.len(), 3);
        let placeholder = files.last().unwrap();
        assert_eq!(placeholder.dependency.len(), 2);
        assert_eq!(placeholder.public_dependency, vec![0, 1]);

        let ext = files.iter().find(|f| f.package() == "ext").unwrap();
        assert_eq!(ext.syntax(), "proto3");
        assert_eq!(ext.message_type[0].name(), "Thing");
        assert_eq!(ext.enum_type[0].value[0].name(), "COLOR_PLACEHOLDER");

        let widget = files.iter().find(|f| f.package() == "other.pkg").unwrap();
        assert_eq!(widget.message_type[0].name(), "Widget");

        // Every missing import of the importer exposes the same type files
        let also = plan.files_for("also_gone.proto");
        assert_eq!(also.last().unwrap().dependency, placeholder.dependency);
    }

    #[test]
    fn test_extendee_gets_extension_range() {
        let mut file = importer("a.proto", &["gone.proto"], Vec::new());
        file.extension.push(FieldDescriptorProto {
            name: Some("tag".to_string()),
            number: Some(100),
            r#type: Some(Type::Int32 as i32),
            extendee: Some(".ext.Base".to_string()),
            ..Default::default()
        });

        let plan = PlaceholderPlan::new(&[file], |name| name == "a.proto");
        let files = plan.files_for("gone.proto");
        assert_eq!(files[0].syntax(), "proto2");
        let base = &files[0].message_type[0];
        assert_eq!(base.name(), "Base");
        assert_eq!(base.extension_range.len(), 1);
        assert_eq!(base.extension_range[0].end(), MAX_FIELD_NUMBER as i32 + 1);
    }

    #[test]
    fn test_nested_types_declared_inside_parent() {
        let files = [importer(
            "a.proto",
            &["gone.proto"],
            vec![
                field("outer", Type::Message, ".ext.Outer"),
                field("kind", Type::Enum, ".ext.Outer.Kind"),
                field("leaf", Type::Message, ".ext.Outer.Mid.Leaf"),
            ],
        )];
        let plan = PlaceholderPlan::new(&files, |name| name == "a.proto");
        // Mid is added so Leaf has somewhere to live
        assert_eq!(plan.type_count(), 4);

        let files = plan.files_for("gone.proto");
        assert_eq!(files.len(), 2);
        let ext = &files[0];
        assert_eq!(ext.package(), "ext");
        assert_eq!(ext.message_type.len(), 1);
        assert!(ext.enum_type.is_empty());

        let outer = &ext.message_type[0];
        assert_eq!(outer.name(), "Outer");
        assert_eq!(outer.enum_type[0].name(), "Kind");
        assert_eq!(outer.nested_type[0].name(), "Mid");
        assert_eq!(outer.nested_type[0].nested_type[0].name(), "Leaf");
    }

    #[test]
    fn test_shared_type_exposed_to_every_importer() {
        let files = [
            importer("a.proto", &["x.proto"], vec![field("t", Type::Message, ".ext.T")]),
            importer("b.proto", &["y.proto"], vec![field("t", Type::Message, ".ext.T")]),
        ];
        let plan = PlaceholderPlan::new(&files, |name| name == "a.proto" || name == "b.proto");
        assert_eq!(plan.type_count(), 1);

        let x = plan.files_for("x.proto");
        let y = plan.files_for("y.proto");
        assert_eq!(x.len(), 2);
        assert_eq!(y.len(), 2);
        assert_eq!(x[0], y[0]);
    }
}
