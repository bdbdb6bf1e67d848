//! Encapsulate field: hide a module-level variable behind properties.
//!
//! The operation:
//! 1. Classifies the field's declared type to decide which accessors apply
//!    (`Property Let` for values, `Property Set` for objects, both or either
//!    for `Variant` depending on how the field is first assigned)
//! 2. Makes the field `Private`, splitting it out of a multi-variable
//!    declaration when needed
//! 3. Appends `Property Get` plus the chosen `Let`/`Set` accessors
//! 4. Points references from other modules at the property

use ducktool_core::config::RefactoringConfig;
use ducktool_core::graph::{Accessibility, Declaration, DeclarationGraph, DeclarationKind, SyntaxKind};
use ducktool_core::resolver::VARIANT;
use ducktool_core::rewrite::RecordingSession;
use ducktool_core::text::selected_text;
use ducktool_core::validation::validate_vba_identifier;
use serde::Serialize;

use crate::failure::RefactoringFailure;
use crate::notifier::{base_message, FailureMessages};
use crate::ops::{capitalize, module_member_named, split_declaration_items, target_declaration};
use crate::pipeline::{Refactoring, RefactoringModel, RefactoringTarget, RewriteContext, TargetIdentity};

/// Built-in types assigned by value.
pub const VALUE_TYPES: &[&str] = &[
    "Boolean", "Byte", "Currency", "Date", "Decimal", "Double", "Integer", "Long", "LongLong",
    "LongPtr", "Single", "String",
];

// ============================================================================
// Classification
// ============================================================================

/// How values of a field's declared type are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    /// Value types and enumerations: `Let`.
    Value,
    /// Object types: `Set`.
    Object,
    /// `Variant`: decided by usage.
    Dynamic,
}

/// Which accessors can be generated for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessorAvailability {
    pub can_implement_let: bool,
    pub can_implement_set: bool,
}

impl AccessorAvailability {
    fn new(can_implement_let: bool, can_implement_set: bool) -> Self {
        Self {
            can_implement_let,
            can_implement_set,
        }
    }
}

fn base_type(type_name: &str) -> &str {
    // `String * 10` is a String.
    type_name.split('*').next().unwrap_or(type_name).trim()
}

fn is_enumeration(graph: &DeclarationGraph, type_name: &str) -> bool {
    let name = type_name.rsplit('.').next().unwrap_or(type_name);
    graph
        .declarations_named(name)
        .iter()
        .any(|d| d.kind == DeclarationKind::Enumeration)
}

/// Classify a field by its declared type.
pub fn classify(graph: &DeclarationGraph, field: &Declaration) -> FieldCategory {
    let base = base_type(&field.type_name);
    if base.eq_ignore_ascii_case(VARIANT) {
        FieldCategory::Dynamic
    } else if VALUE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(base)) || is_enumeration(graph, base) {
        FieldCategory::Value
    } else {
        FieldCategory::Object
    }
}

/// Accessors available for a field.
///
/// A `Variant` field follows its first write: assigned in a `Let` statement it
/// gets `Let`, in a `Set` statement `Set`, anywhere else (or never) both.
pub fn accessor_availability(graph: &DeclarationGraph, field: &Declaration) -> AccessorAvailability {
    match classify(graph, field) {
        FieldCategory::Value => AccessorAvailability::new(true, false),
        FieldCategory::Object => AccessorAvailability::new(false, true),
        FieldCategory::Dynamic => {
            let first_write = graph
                .references_of(field.id)
                .into_iter()
                .find(|r| r.is_assignment);
            match first_write.and_then(|r| r.assignment_statement()) {
                Some(SyntaxKind::LetStmt) => AccessorAvailability::new(true, false),
                Some(SyntaxKind::SetStmt) => AccessorAvailability::new(false, true),
                _ => AccessorAvailability::new(true, true),
            }
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Choices for encapsulating one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncapsulateFieldModel {
    pub target: TargetIdentity,
    /// Return type of the generated `Property Get`.
    pub field_type: String,
    pub property_name: String,
    /// Parameter name of the `Let`/`Set` accessors.
    pub parameter_name: String,
    pub can_implement_let: bool,
    pub can_implement_set: bool,
    pub implement_let: bool,
    pub implement_set: bool,
}

impl RefactoringModel for EncapsulateFieldModel {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }
}

impl EncapsulateFieldModel {
    /// `Property Get` reading the field.
    fn getter(&self) -> String {
        let field = &self.target.name;
        let property = &self.property_name;
        let body = if self.implement_let && self.implement_set {
            vec![
                format!("If IsObject({}) Then", field),
                format!("    Set {} = {}", property, field),
                "Else".to_string(),
                format!("    {} = {}", property, field),
                "End If".to_string(),
            ]
        } else if self.implement_set {
            vec![format!("Set {} = {}", property, field)]
        } else {
            vec![format!("{} = {}", property, field)]
        };
        accessor(
            &format!("Property Get {}() As {}", property, self.field_type),
            &body,
        )
    }

    /// `Property Let` or `Property Set` assigning the field.
    fn setter(&self, keyword: &str) -> String {
        let assignment = if keyword == "Set" {
            format!("Set {} = {}", self.target.name, self.parameter_name)
        } else {
            format!("{} = {}", self.target.name, self.parameter_name)
        };
        accessor(
            &format!(
                "Property {} {}(ByVal {} As {})",
                keyword, self.property_name, self.parameter_name, self.field_type
            ),
            &[assignment],
        )
    }

    /// Every generated property, in `Get`, `Let`, `Set` order.
    pub fn properties(&self) -> Vec<String> {
        let mut properties = vec![self.getter()];
        if self.implement_let {
            properties.push(self.setter("Let"));
        }
        if self.implement_set {
            properties.push(self.setter("Set"));
        }
        properties
    }
}

fn accessor(header: &str, body: &[String]) -> String {
    let mut lines = vec![format!("Public {}", header)];
    lines.extend(body.iter().map(|line| format!("    {}", line)));
    lines.push("End Property".to_string());
    lines.join("\n")
}

// ============================================================================
// Messages
// ============================================================================

/// Failure wording for encapsulate field.
pub struct EncapsulateFieldMessages;

impl FailureMessages for EncapsulateFieldMessages {
    fn caption(&self) -> &str {
        "Encapsulate Field"
    }

    fn message(&self, failure: &RefactoringFailure) -> Option<String> {
        match failure {
            RefactoringFailure::InvalidDeclarationType { name, actual, .. } => Some(format!(
                "'{}' is a {}. Only module-level variables can be encapsulated.",
                name, actual
            )),
            other => base_message(other),
        }
    }
}

// ============================================================================
// Refactoring
// ============================================================================

/// The encapsulate field operation.
#[derive(Debug, Clone, Default)]
pub struct EncapsulateField {
    config: RefactoringConfig,
}

impl EncapsulateField {
    pub fn new(config: RefactoringConfig) -> Self {
        Self { config }
    }
}

const EXPECTED: &str = "a module-level variable that is not an array";

impl Refactoring for EncapsulateField {
    type Model = EncapsulateFieldModel;

    fn name(&self) -> &'static str {
        "encapsulate-field"
    }

    fn messages(&self) -> &dyn FailureMessages {
        &EncapsulateFieldMessages
    }

    fn build_model(
        &self,
        graph: &DeclarationGraph,
        target: &RefactoringTarget,
    ) -> Result<EncapsulateFieldModel, RefactoringFailure> {
        let field = target_declaration(graph, target)?;
        if field.kind != DeclarationKind::Variable || !graph.is_module_level(field) || field.is_array {
            return Err(RefactoringFailure::invalid_type(&field.name, field.kind, EXPECTED));
        }

        let capitalized = capitalize(&field.name);
        let property_name = if module_member_named(graph, &field.module, &capitalized, &[]).is_some() {
            format!("{}Value", capitalized)
        } else {
            capitalized
        };
        let field_type = match base_type(&field.type_name) {
            base if base.eq_ignore_ascii_case("String") => "String".to_string(),
            _ => field.type_name.clone(),
        };
        let availability = accessor_availability(graph, field);
        Ok(EncapsulateFieldModel {
            target: TargetIdentity::of(field),
            field_type,
            property_name,
            parameter_name: self.config.parameter_name.clone(),
            can_implement_let: availability.can_implement_let,
            can_implement_set: availability.can_implement_set,
            implement_let: availability.can_implement_let,
            implement_set: availability.can_implement_set,
        })
    }

    fn validate(&self, graph: &DeclarationGraph, model: &EncapsulateFieldModel) -> Result<(), RefactoringFailure> {
        validate_vba_identifier(&model.property_name)?;
        validate_vba_identifier(&model.parameter_name)?;

        if !model.implement_let && !model.implement_set {
            return Err(RefactoringFailure::validation(
                "choose at least one of Property Let and Property Set",
            ));
        }
        if model.implement_let && !model.can_implement_let {
            return Err(RefactoringFailure::validation(format!(
                "'{}' cannot have a Property Let",
                model.target.name
            )));
        }
        if model.implement_set && !model.can_implement_set {
            return Err(RefactoringFailure::validation(format!(
                "'{}' cannot have a Property Set",
                model.target.name
            )));
        }

        let module = &model.target.selection.module;
        if let Some(existing) = module_member_named(graph, module, &model.property_name, &[]) {
            return Err(RefactoringFailure::validation(format!(
                "{} already has a {} named '{}'",
                module.module, existing.kind, existing.name
            )));
        }
        if model.parameter_name.eq_ignore_ascii_case(&model.property_name)
            || model.parameter_name.eq_ignore_ascii_case(&model.target.name)
        {
            return Err(RefactoringFailure::validation(format!(
                "the parameter name '{}' must differ from the field and property names",
                model.parameter_name
            )));
        }
        Ok(())
    }

    fn rewrite(
        &self,
        context: &RewriteContext<'_>,
        model: &EncapsulateFieldModel,
        edits: &mut RecordingSession,
    ) -> Result<(), RefactoringFailure> {
        let graph = context.graph;
        let field = model
            .target
            .resolve(graph)
            .ok_or_else(|| RefactoringFailure::TargetStale {
                name: model.target.name.clone(),
            })?;
        let module = &field.module;
        let text = context.module_text(module)?;

        rewrite_field_declaration(graph, field, &text, edits);

        for reference in graph.references_of(field.id) {
            if &reference.selection.module != module {
                edits.replace(
                    &reference.selection.module,
                    reference.selection.selection,
                    &model.property_name,
                );
            }
        }

        edits.append(module, &format!("\n{}\n", model.properties().join("\n\n")));
        Ok(())
    }
}

/// Make `field` private. A field sharing its statement with other variables
/// is moved to a statement of its own.
fn rewrite_field_declaration(
    graph: &DeclarationGraph,
    field: &Declaration,
    text: &str,
    edits: &mut RecordingSession,
) {
    let statement = field.context_selection.unwrap_or(field.selection);
    let siblings = graph.members(&field.module, |d| {
        d.kind == DeclarationKind::Variable && d.context_selection == field.context_selection
    });
    if field.accessibility == Accessibility::Private && siblings.len() <= 1 {
        return;
    }

    let original = selected_text(text, &statement).unwrap_or("");
    let (keyword, list) = original
        .split_once(char::is_whitespace)
        .unwrap_or(("Private", original));
    let items = split_declaration_items(list);
    let item_of = |index: usize, declaration: &Declaration| -> String {
        if items.len() == siblings.len() {
            items[index].to_string()
        } else {
            let array = if declaration.is_array { "()" } else { "" };
            format!("{}{} As {}", declaration.name, array, declaration.type_name)
        }
    };

    let mut kept = Vec::new();
    let mut moved = String::new();
    for (index, sibling) in siblings.iter().enumerate() {
        if sibling.id == field.id {
            moved = item_of(index, sibling);
        } else {
            kept.push(item_of(index, sibling));
        }
    }
    let replacement = if kept.is_empty() {
        format!("Private {}", moved)
    } else {
        format!("{} {}\nPrivate {}", keyword, kept.join(", "), moved)
    };
    edits.replace(&field.module, statement, &replacement);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ducktool_core::analysis::ModuleKind;
    use ducktool_core::resolver::{build_declarations, resolve_references};
    use ducktool_core::scan::scan_module;
    use ducktool_core::types::QualifiedModuleName;
    use std::sync::Arc;

    fn qmn(name: &str) -> QualifiedModuleName {
        QualifiedModuleName::new("VBAProject", name)
    }

    fn graph(modules: &[(&str, ModuleKind, &str)]) -> DeclarationGraph {
        let analyses: Vec<_> = modules
            .iter()
            .map(|(name, kind, source)| Arc::new(scan_module(qmn(name), *kind, source).unwrap()))
            .collect();
        let declared = build_declarations("VBAProject", &analyses).unwrap();
        resolve_references(declared, &analyses).unwrap().0
    }

    fn field<'g>(graph: &'g DeclarationGraph, module: &str, name: &str) -> &'g Declaration {
        graph
            .members(&qmn(module), |d| d.name == name)
            .into_iter()
            .next()
            .unwrap()
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn value_type_with_let_write_is_let_only() {
            let g = graph(&[(
                "Class1",
                ModuleKind::Class,
                "Private d As Boolean\nSub Foo()\n    d = True\nEnd Sub\n",
            )]);
            let d = field(&g, "Class1", "d");
            assert_eq!(classify(&g, d), FieldCategory::Value);
            assert_eq!(accessor_availability(&g, d), AccessorAvailability::new(true, false));
        }

        #[test]
        fn object_type_with_set_write_is_set_only() {
            let g = graph(&[(
                "Class1",
                ModuleKind::Class,
                "Private items As Collection\nSub Foo()\n    Set items = New Collection\nEnd Sub\n",
            )]);
            let items = field(&g, "Class1", "items");
            assert_eq!(classify(&g, items), FieldCategory::Object);
            assert_eq!(accessor_availability(&g, items), AccessorAvailability::new(false, true));
        }

        #[test]
        fn variant_without_writes_gets_both() {
            let g = graph(&[("Class1", ModuleKind::Class, "Private v\nPrivate w As Variant\n")]);
            for name in ["v", "w"] {
                let v = field(&g, "Class1", name);
                assert_eq!(classify(&g, v), FieldCategory::Dynamic);
                assert_eq!(accessor_availability(&g, v), AccessorAvailability::new(true, true));
            }
        }

        #[test]
        fn variant_follows_first_write() {
            let g = graph(&[(
                "Class1",
                ModuleKind::Class,
                "Private v As Variant\nSub Foo()\n    Set v = Nothing\n    v = 1\nEnd Sub\n",
            )]);
            let v = field(&g, "Class1", "v");
            assert_eq!(accessor_availability(&g, v), AccessorAvailability::new(false, true));
        }

        #[test]
        fn enumeration_and_fixed_string_are_values() {
            let g = graph(&[
                (
                    "Module1",
                    ModuleKind::Procedural,
                    "Public Enum Color\n    Red\nEnd Enum\n",
                ),
                (
                    "Class1",
                    ModuleKind::Class,
                    "Private c As Color\nPrivate s As String * 10\n",
                ),
            ]);
            assert_eq!(classify(&g, field(&g, "Class1", "c")), FieldCategory::Value);
            assert_eq!(classify(&g, field(&g, "Class1", "s")), FieldCategory::Value);
        }
    }

    mod model_tests {
        use super::*;

        #[test]
        fn property_name_avoids_collisions() {
            let g = graph(&[(
                "Class1",
                ModuleKind::Class,
                "Private total As Long\nPrivate d As Boolean\n",
            )]);
            let op = EncapsulateField::default();

            let total = field(&g, "Class1", "total");
            let model = op
                .build_model(&g, &RefactoringTarget::Declaration(total.id))
                .unwrap();
            // `Total` is the field itself, names being case-insensitive.
            assert_eq!(model.property_name, "TotalValue");
            assert_eq!(model.parameter_name, "value");

            let d = field(&g, "Class1", "d");
            let model = op.build_model(&g, &RefactoringTarget::Declaration(d.id)).unwrap();
            assert_eq!(model.property_name, "DValue");
            assert!(model.implement_let);
            assert!(!model.implement_set);
        }

        #[test]
        fn locals_and_members_are_rejected() {
            let g = graph(&[(
                "Class1",
                ModuleKind::Class,
                "Sub Foo()\n    Dim x As Long\nEnd Sub\n",
            )]);
            let op = EncapsulateField::default();
            let foo = field(&g, "Class1", "Foo");
            let err = op
                .build_model(&g, &RefactoringTarget::Declaration(foo.id))
                .unwrap_err();
            assert!(matches!(
                err,
                RefactoringFailure::InvalidDeclarationType {
                    actual: DeclarationKind::Procedure,
                    ..
                }
            ));

            let x = g.children_of(foo.id)[0];
            let err = op.build_model(&g, &RefactoringTarget::Declaration(x.id)).unwrap_err();
            assert!(matches!(err, RefactoringFailure::InvalidDeclarationType { .. }));
        }

        #[test]
        fn validation_requires_an_accessor_and_a_free_name() {
            let g = graph(&[(
                "Class1",
                ModuleKind::Class,
                "Private total As Long\nPublic Sub Reset()\nEnd Sub\n",
            )]);
            let op = EncapsulateField::default();
            let total = field(&g, "Class1", "total");
            let model = op
                .build_model(&g, &RefactoringTarget::Declaration(total.id))
                .unwrap();
            assert!(op.validate(&g, &model).is_ok());

            let mut none = model.clone();
            none.implement_let = false;
            assert!(op.validate(&g, &none).is_err());

            let mut taken = model.clone();
            taken.property_name = "Reset".to_string();
            assert!(op.validate(&g, &taken).is_err());

            let mut set = model;
            set.implement_set = true;
            assert!(op.validate(&g, &set).is_err());
        }
    }

    mod generation_tests {
        use super::*;

        fn model(implement_let: bool, implement_set: bool) -> EncapsulateFieldModel {
            EncapsulateFieldModel {
                target: TargetIdentity {
                    selection: ducktool_core::types::QualifiedSelection::new(
                        qmn("Class1"),
                        ducktool_core::types::Selection::on_line(1, 9, 1),
                    ),
                    name: "v".to_string(),
                    kind: DeclarationKind::Variable,
                },
                field_type: "Variant".to_string(),
                property_name: "Item".to_string(),
                parameter_name: "value".to_string(),
                can_implement_let: true,
                can_implement_set: true,
                implement_let,
                implement_set,
            }
        }

        #[test]
        fn let_only_properties() {
            let properties = model(true, false).properties();
            assert_eq!(
                properties,
                vec![
                    "Public Property Get Item() As Variant\n    Item = v\nEnd Property".to_string(),
                    "Public Property Let Item(ByVal value As Variant)\n    v = value\nEnd Property".to_string(),
                ]
            );
        }

        #[test]
        fn both_accessors_branch_in_getter() {
            let properties = model(true, true).properties();
            assert_eq!(properties.len(), 3);
            assert!(properties[0].contains("If IsObject(v) Then\n        Set Item = v\n    Else\n        Item = v\n    End If"));
            assert_eq!(
                properties[2],
                "Public Property Set Item(ByVal value As Variant)\n    Set v = value\nEnd Property"
            );
        }
    }
}
