//! The lowered Program and its modules.

use crate::function::{Expr, IrFnId, IrFunction, IrVarId, IrVariable, VarRole};
use serde::{Deserialize, Serialize};
use sonance_ast::ast::{EndpointKind, InterpolationMode, ModuleKind};
use sonance_ast::foundation::Annotation;
use sonance_ast::types::{ConstantTable, StringDictionary, Structure, Type, TypeKind, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Synthetic namespace every module hangs under.
pub const ROOT_NAMESPACE: &str = "_root";

/// Name of the implicit console output endpoint.
pub const CONSOLE_ENDPOINT: &str = "_console";

/// A complete lowered program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub modules: Vec<Module>,
    /// All variables: module state, parameters and function locals.
    pub variables: Vec<IrVariable>,
    /// All functions; modules list the ids they own.
    pub functions: Vec<IrFunction>,
    pub string_dictionary: StringDictionary,
    pub constant_table: ConstantTable,
}

/// One namespace, processor or graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Unqualified name.
    pub name: String,
    /// Fully qualified name including the root namespace.
    pub full_name: String,
    pub kind: ModuleKind,
    pub annotation: Annotation,
    pub inputs: Vec<IrEndpoint>,
    pub outputs: Vec<IrEndpoint>,
    pub connections: Vec<IrConnection>,
    pub instances: Vec<IrProcessorInstance>,
    pub state_variables: Vec<IrVarId>,
    pub functions: Vec<IrFnId>,
    pub structs: Vec<Arc<Structure>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrEndpoint {
    pub name: String,
    pub kind: EndpointKind,
    pub data_types: Vec<Type>,
    pub array_size: Option<u32>,
    pub annotation: Annotation,
}

impl IrEndpoint {
    pub fn is_console(&self) -> bool {
        self.kind == EndpointKind::Event && self.name == CONSOLE_ENDPOINT
    }

    /// The type one frame/value of this endpoint carries, with the gang
    /// array applied.
    pub fn value_type(&self) -> Option<Type> {
        let single = self.data_types.first()?.clone();
        Some(match self.array_size {
            Some(n) => Type::fixed_array(single, n),
            None => single,
        })
    }
}

/// A lowered connection between endpoints of two instances (or the graph
/// itself, when an end has no instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrConnection {
    pub interpolation: InterpolationMode,
    pub source_instance: Option<String>,
    pub source_endpoint: String,
    pub source_endpoint_index: Option<u32>,
    pub dest_instance: Option<String>,
    pub dest_endpoint: String,
    pub dest_endpoint_index: Option<u32>,
    /// Zero means no delay line.
    pub delay_length: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrProcessorInstance {
    pub instance_name: String,
    /// Full name of the module this instantiates.
    pub source_module: String,
    pub clock_multiplier: i64,
    pub clock_divider: i64,
    pub array_size: u32,
}

impl IrProcessorInstance {
    pub fn clock_ratio(&self) -> f64 {
        self.clock_multiplier as f64 / self.clock_divider as f64
    }
}

/// The endpoint schema handed to the performer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDetails {
    /// `in:` or `out:` plus the endpoint name.
    pub id: String,
    pub name: String,
    pub kind: EndpointKind,
    pub data_types: Vec<Type>,
    pub annotation: Annotation,
    pub array_size: Option<u32>,
    pub is_console: bool,
}

/// Annotation-derived description of a parameter-style endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterProperties {
    pub name: String,
    pub unit: String,
    pub group: String,
    pub text: String,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub init: f32,
    pub ramp_frames: u32,
    pub automatable: bool,
    pub boolean: bool,
    pub hidden: bool,
}

impl EndpointDetails {
    fn from_endpoint(e: &IrEndpoint, direction: &str) -> Self {
        Self {
            id: format!("{direction}:{}", e.name),
            name: e.name.clone(),
            kind: e.kind,
            data_types: e.data_types.clone(),
            annotation: e.annotation.clone(),
            array_size: e.array_size,
            is_console: e.is_console(),
        }
    }

    /// Interpret the annotation as plugin-parameter metadata.
    pub fn parameter_properties(&self, strings: &StringDictionary) -> ParameterProperties {
        let a = &self.annotation;
        let get_str = |key: &str| -> String {
            a.get(key)
                .and_then(|v| v.string_handle())
                .and_then(|h| strings.get(h))
                .unwrap_or_default()
                .to_string()
        };
        let min = a.get_f64("min").unwrap_or(0.0) as f32;
        let max = a.get_f64("max").unwrap_or(1.0) as f32;
        let intervals = a.get_f64("intervals").filter(|n| *n > 0.0);
        let step = a
            .get_f64("step")
            .map(|s| s as f32)
            .or_else(|| intervals.map(|n| (max - min) / n as f32))
            .unwrap_or(0.0);
        ParameterProperties {
            name: self.name.clone(),
            unit: get_str("unit"),
            group: get_str("group"),
            text: get_str("text"),
            min,
            max,
            step,
            init: a.get_f64("init").map(|v| v as f32).unwrap_or(min),
            ramp_frames: a.get_f64("rampFrames").unwrap_or(0.0) as u32,
            automatable: a.get("automatable").is_none() || a.get_bool("automatable"),
            boolean: a.get_bool("boolean"),
            hidden: a.get_bool("hidden"),
        }
    }
}

impl Module {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            kind,
            annotation: Annotation::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            connections: Vec::new(),
            instances: Vec::new(),
            state_variables: Vec::new(),
            functions: Vec::new(),
            structs: Vec::new(),
        }
    }

    pub fn is_processor_base(&self) -> bool {
        self.kind.is_processor_base()
    }

    pub fn input_details(&self) -> Vec<EndpointDetails> {
        self.inputs
            .iter()
            .map(|e| EndpointDetails::from_endpoint(e, "in"))
            .collect()
    }

    pub fn output_details(&self) -> Vec<EndpointDetails> {
        self.outputs
            .iter()
            .map(|e| EndpointDetails::from_endpoint(e, "out"))
            .collect()
    }

    pub fn find_function<'p>(&self, program: &'p Program, name: &str) -> Option<&'p IrFunction> {
        self.functions
            .iter()
            .map(|&f| program.function(f))
            .find(|f| f.name == name)
    }
}

impl Program {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
            string_dictionary: StringDictionary::new(),
            constant_table: ConstantTable::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn variable(&self, id: IrVarId) -> &IrVariable {
        &self.variables[id.0 as usize]
    }

    pub fn variable_mut(&mut self, id: IrVarId) -> &mut IrVariable {
        &mut self.variables[id.0 as usize]
    }

    pub fn function(&self, id: IrFnId) -> &IrFunction {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: IrFnId) -> &mut IrFunction {
        &mut self.functions[id.0 as usize]
    }

    pub fn add_variable(&mut self, v: IrVariable) -> IrVarId {
        let id = IrVarId(self.variables.len() as u32);
        self.variables.push(v);
        id
    }

    pub fn add_function(&mut self, f: IrFunction) -> IrFnId {
        let id = IrFnId(self.functions.len() as u32);
        self.functions.push(f);
        id
    }

    /// The module that should be the program's entry point.
    ///
    /// A `main: true` annotation wins; otherwise the choice is the only
    /// processor or graph not annotated `main: false`. Several untagged
    /// candidates mean there is no main processor.
    pub fn main_module(&self) -> Option<&Module> {
        if let Some(m) = self
            .modules
            .iter()
            .find(|m| m.is_processor_base() && m.annotation.get_bool("main"))
        {
            return Some(m);
        }
        let candidates: Vec<&Module> = self
            .modules
            .iter()
            .filter(|m| m.is_processor_base())
            .filter(|m| match m.annotation.get("main") {
                Some(v) => v.as_bool().unwrap_or(false),
                None => true,
            })
            .collect();
        match candidates.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn module_with_name(&self, full_name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.full_name == full_name)
    }

    /// Find a function by `namespace::name` path (with or without the
    /// root prefix).
    pub fn function_with_name(&self, qualified: &str) -> Option<(&Module, &IrFunction)> {
        let path = Self::strip_root(qualified);
        let (module_path, name) = path.rsplit_once("::")?;
        let module = self
            .modules
            .iter()
            .find(|m| Self::strip_root(&m.full_name) == module_path)?;
        let function = module.find_function(self, name)?;
        Some((module, function))
    }

    /// The module that owns a function.
    pub fn module_containing_function(&self, id: IrFnId) -> Option<&Module> {
        self.modules.iter().find(|m| m.functions.contains(&id))
    }

    /// State variables declared external, to be supplied before linking.
    pub fn external_variables(&self) -> Vec<IrVarId> {
        self.modules
            .iter()
            .flat_map(|m| m.state_variables.iter().copied())
            .filter(|&v| self.variable(v).role == VarRole::External)
            .collect()
    }

    /// Strip the internal root namespace from a user-facing path.
    pub fn strip_root(path: &str) -> &str {
        path.strip_prefix(ROOT_NAMESPACE)
            .map(|p| p.strip_prefix("::").unwrap_or(p))
            .unwrap_or(path)
    }

    /// Deep copy with fresh struct identities, preserved consistently
    /// through a cross-reference map so nominal equality still holds
    /// inside the clone.
    pub fn clone_deep(&self) -> Program {
        let mut clone = self.clone();
        let mut remap: HashMap<*const Structure, Arc<Structure>> = HashMap::new();
        for module in &mut clone.modules {
            for s in &mut module.structs {
                let new = remap_struct(s, &mut remap);
                *s = new;
            }
        }
        for v in &mut clone.variables {
            v.ty = remap_type(&v.ty, &mut remap);
        }
        for f in &mut clone.functions {
            f.return_type = remap_type(&f.return_type, &mut remap);
            f.visit_exprs_mut(|e, _| remap_expr_types(e, &mut remap));
        }
        clone
    }

    /// Stable FNV-1a hash over the printed form, usable as a cache key.
    pub fn hash(&self) -> u64 {
        let text = crate::printer::print_program(self);
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    /// Render a value, resolving string handles through this program's
    /// dictionary.
    pub fn describe_value(&self, v: &Value) -> String {
        v.describe(Some(&self.string_dictionary))
    }
}

fn remap_struct(
    s: &Arc<Structure>,
    remap: &mut HashMap<*const Structure, Arc<Structure>>,
) -> Arc<Structure> {
    if let Some(existing) = remap.get(&Arc::as_ptr(s)) {
        return existing.clone();
    }
    // Member types cannot cycle back (recursive types are rejected), so a
    // direct recursive remap terminates.
    let members = s
        .members
        .iter()
        .map(|m| sonance_ast::types::StructMember {
            name: m.name.clone(),
            ty: remap_type(&m.ty, remap),
        })
        .collect();
    let arc = Arc::new(Structure {
        name: s.name.clone(),
        members,
    });
    remap.insert(Arc::as_ptr(s), arc.clone());
    arc
}

fn remap_type(ty: &Type, remap: &mut HashMap<*const Structure, Arc<Structure>>) -> Type {
    let kind = match &ty.kind {
        TypeKind::Struct(s) => TypeKind::Struct(remap_struct(s, remap)),
        TypeKind::FixedArray { element, size } => TypeKind::FixedArray {
            element: Box::new(remap_type(element, remap)),
            size: *size,
        },
        TypeKind::UnsizedArray { element } => TypeKind::UnsizedArray {
            element: Box::new(remap_type(element, remap)),
        },
        other => other.clone(),
    };
    Type {
        kind,
        is_const: ty.is_const,
        is_reference: ty.is_reference,
    }
}

fn remap_expr_types(e: &mut Expr, remap: &mut HashMap<*const Structure, Arc<Structure>>) {
    match e {
        Expr::Binary { ty, .. }
        | Expr::Unary { ty, .. }
        | Expr::PureCall { ty, .. }
        | Expr::Element { ty, .. }
        | Expr::Member { ty, .. } => *ty = remap_type(ty, remap),
        Expr::Cast { dest, .. } => *dest = remap_type(dest, remap),
        Expr::Constant(_) | Expr::Variable(_) | Expr::ProcessorProperty(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonance_ast::types::Value;

    fn processor(name: &str) -> Module {
        Module::new(name, format!("{ROOT_NAMESPACE}::{name}"), ModuleKind::Processor)
    }

    #[test]
    fn test_sole_processor_is_main() {
        let mut p = Program::new();
        p.modules.push(processor("Gain"));
        assert_eq!(p.main_module().unwrap().name, "Gain");
    }

    #[test]
    fn test_main_annotation_wins() {
        let mut p = Program::new();
        p.modules.push(processor("A"));
        let mut b = processor("B");
        b.annotation.set("main", Value::from_bool(true));
        p.modules.push(b);
        assert_eq!(p.main_module().unwrap().name, "B");
    }

    #[test]
    fn test_main_false_excludes_candidate() {
        let mut p = Program::new();
        let mut a = processor("A");
        a.annotation.set("main", Value::from_bool(false));
        p.modules.push(a);
        p.modules.push(processor("B"));
        assert_eq!(p.main_module().unwrap().name, "B");
    }

    #[test]
    fn test_two_untagged_candidates_mean_no_main() {
        let mut p = Program::new();
        p.modules.push(processor("A"));
        p.modules.push(processor("B"));
        assert!(p.main_module().is_none());
    }

    #[test]
    fn test_strip_root() {
        assert_eq!(Program::strip_root("_root::a::b"), "a::b");
        assert_eq!(Program::strip_root("a::b"), "a::b");
    }

    #[test]
    fn test_clone_preserves_struct_identity() {
        let mut p = Program::new();
        let s = Arc::new(Structure {
            name: "Frame".to_string(),
            members: vec![],
        });
        let mut m = processor("P");
        m.structs.push(s.clone());
        p.modules.push(m);
        let v = p.add_variable(IrVariable::new("f", Type::structure(s), VarRole::State));
        p.modules[0].state_variables.push(v);

        let clone = p.clone_deep();
        let cloned_struct = clone.modules[0].structs[0].clone();
        let cloned_var_ty = &clone.variable(clone.modules[0].state_variables[0]).ty;
        // same identity inside the clone, distinct from the original
        assert!(cloned_var_ty.is_identical(&Type::structure(cloned_struct.clone())));
        assert!(!Arc::ptr_eq(&cloned_struct, &p.modules[0].structs[0]));
    }
}
