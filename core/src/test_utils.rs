//! Shared fixtures for unit tests.

use alloc::string::ToString;

use crate::memory::{Arena, HandleTable, Resource};
use crate::program::{Function, ProgramArchive};
use crate::types::{Field, TypeDesc, TypeRef, TypeTable, Variant};
use crate::values::raw::{self, BlockData};
use crate::vec;

/// Initialize tracing subscriber for tests with DEBUG level
/// Call this at the start of tests where you want to see logging output
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    // Try to initialize, ignore error if already initialized
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// A small game-like program state:
///
/// ```text
/// Shape = Empty | Box(Int, Int) | Named(String)
/// State = {score: Int, name: String, scores: List[Int], texture: Texture, shapes: List[Shape]}
/// main : (Int, State) -> State
/// ```
pub struct Sample {
    pub types: TypeTable,
    pub int: TypeRef,
    pub string: TypeRef,
    pub int_list: TypeRef,
    pub texture: TypeRef,
    pub shape: TypeRef,
    pub shape_list: TypeRef,
    pub state: TypeRef,
    pub main: TypeRef,
}

impl Sample {
    pub fn new() -> Self {
        let mut types = TypeTable::default();
        let int = types.push(TypeDesc::Int).unwrap();
        let string = types.push(TypeDesc::Str).unwrap();
        let int_list = types.push(TypeDesc::List(int)).unwrap();
        let texture = types
            .push(TypeDesc::Unmanaged {
                name: "Texture".to_string(),
            })
            .unwrap();
        let shape = types
            .push(TypeDesc::Custom {
                name: "Shape".to_string(),
                variants: vec![
                    Variant {
                        name: "Empty".to_string(),
                        fields: vec![],
                    },
                    Variant {
                        name: "Box".to_string(),
                        fields: vec![int, int],
                    },
                    Variant {
                        name: "Named".to_string(),
                        fields: vec![string],
                    },
                ],
            })
            .unwrap();
        let shape_list = types.push(TypeDesc::List(shape)).unwrap();
        let state = types
            .push(TypeDesc::Record(vec![
                field("score", int),
                field("name", string),
                field("scores", int_list),
                field("texture", texture),
                field("shapes", shape_list),
            ]))
            .unwrap();
        let main = types
            .push(TypeDesc::Function {
                params: vec![int, state],
                ret: state,
            })
            .unwrap();
        Sample {
            types,
            int,
            string,
            int_list,
            texture,
            shape,
            shape_list,
            state,
            main,
        }
    }

    /// An archive whose `main` is `(Int, State) -> State`, plus a `reset`
    /// helper of the same type.
    pub fn archive(&self) -> ProgramArchive {
        let params = self.types.fields_layout(&[self.int, self.state]).unwrap();
        let main = function("main", self.main, params.layout.size, 2, self.state_size());
        let reset = function("reset", self.main, params.layout.size, 2, self.state_size());
        ProgramArchive::new(self.types.clone(), vec![main, reset])
    }

    pub fn state_size(&self) -> usize {
        self.types.layout(self.state).unwrap().size
    }

    /// Allocates a state value in `arena` and returns its address.
    ///
    /// `shapes` is always `[Box(score, 2), Named(name), Empty]`.
    pub fn alloc_state(
        &self,
        arena: &Arena,
        handles: &mut HandleTable,
        score: i32,
        name: &str,
        scores: &[i32],
        texture: Option<Resource>,
    ) -> *mut u8 {
        let layout = self.types.layout(self.state).unwrap();
        let root = arena.alloc_zeroed(layout.size, layout.align).unwrap().as_ptr();
        unsafe { self.write_state(root, arena, handles, score, name, scores, texture) };
        root
    }

    /// Writes a state value into `slot`.
    ///
    /// # Safety
    ///
    /// `slot` must be valid for writing a state value.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn write_state(
        &self,
        slot: *mut u8,
        arena: &Arena,
        handles: &mut HandleTable,
        score: i32,
        name: &str,
        scores: &[i32],
        texture: Option<Resource>,
    ) {
        let fields = [self.int, self.string, self.int_list, self.texture, self.shape_list];
        let offsets = self.types.fields_layout(&fields).unwrap().offsets;
        unsafe {
            raw::write_i32(slot.add(offsets[0]), score);
            self.alloc_str(arena, name).store(slot.add(offsets[1]));

            let list_block = self.types.list_block(self.int).unwrap();
            let list = BlockData::new_list(arena, list_block, scores.len()).unwrap();
            for (i, value) in scores.iter().enumerate() {
                raw::write_i32(list.element(list_block, i), *value);
            }
            list.store(slot.add(offsets[2]));

            if let Some(resource) = texture {
                let handle = handles.register(resource).unwrap();
                raw::write_handle(slot.add(offsets[3]), handle);
            }

            let shape_block = self.types.list_block(self.shape).unwrap();
            let custom = self.types.custom_layout(self.shape).unwrap();
            let shapes = BlockData::new_list(arena, shape_block, 3).unwrap();
            let boxed = shapes.element(shape_block, 0);
            *boxed = 1;
            raw::write_i32(boxed.add(custom.payload_offset), score);
            raw::write_i32(boxed.add(custom.payload_offset + 4), 2);
            let named = shapes.element(shape_block, 1);
            *named = 2;
            self.alloc_str(arena, name).store(named.add(custom.payload_offset));
            *shapes.element(shape_block, 2) = 0;
            shapes.store(slot.add(offsets[4]));
        }
    }

    fn alloc_str<'a>(&self, arena: &'a Arena, s: &str) -> BlockData<'a> {
        BlockData::new_bytes(arena, s.as_bytes()).unwrap()
    }

    /// Renders the value at `value` as a state.
    pub fn dump(&self, value: *const u8, handles: &HandleTable) -> crate::String {
        let mut out = crate::String::new();
        unsafe { crate::values::write_value(&mut out, value, self.state, &self.types, handles) }
            .unwrap();
        out
    }
}

/// A program whose state is a single `Int`: `main : (Int, Int) -> Int`.
pub fn counter_archive() -> ProgramArchive {
    let mut types = TypeTable::default();
    let int = types.push(TypeDesc::Int).unwrap();
    let main = types
        .push(TypeDesc::Function {
            params: vec![int, int],
            ret: int,
        })
        .unwrap();
    ProgramArchive::new(types, vec![function("main", main, 8, 2, 4)])
}

pub fn function(
    name: &str,
    ty: TypeRef,
    parameters_octet_size: usize,
    parameter_count: usize,
    return_octet_size: usize,
) -> Function {
    Function {
        name: name.to_string(),
        ty,
        parameters_octet_size,
        parameter_count,
        return_octet_size,
        code: vec![],
        debug_lines: vec![],
    }
}

pub fn field(name: &str, ty: TypeRef) -> Field {
    Field {
        name: name.to_string(),
        ty,
    }
}
