// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Reading PE modules into owned records.
//!
//! [`ModuleLoader`] loads the root module, then walks its `AssemblyRef` rows breadth first
//! and loads every referenced assembly exactly once. Each module is read completely at
//! load time: all tables the compiler needs are copied into records and every method body
//! is decoded into [`Instruction`](crate::disassembler::Instruction)s, so later stages never
//! touch the file again.
//!
//! # Example
//!
//! ```rust,no_run
//! use dotnative::{model::ModuleLoader, BuildConfig};
//!
//! let set = ModuleLoader::new("app/Program.exe")
//!     .search_path("/usr/share/dotnet/shared/Microsoft.NETCore.App/8.0.0")
//!     .load(&BuildConfig::default())?;
//! println!("{} modules", set.modules().len());
//! # Ok::<(), dotnative::Error>(())
//! ```

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    config::BuildConfig,
    disassembler::decode_stream,
    file::{parser::Parser, File},
    metadata::{
        cor20header::Cor20Header,
        image::MetadataImage,
        method::{MethodAttributes, MethodBody, MethodImplAttributes},
        pdb::PortablePdb,
        root::CIL_HEADER_MAGIC,
        signatures::{
            parse_field_signature, parse_local_var_signature, parse_method_signature,
            parse_method_spec_signature, parse_type_spec_signature,
        },
        tables::{Row, TableId},
        token::Token,
    },
    model::{
        moduleset::{Arenas, ModuleSet},
        probing::{private_paths, public_key_token, ProbePaths},
        records::{
            AssemblyRefRecord, AttributeRecord, ExportedTypeRecord, FieldId, FieldRecord,
            MemberRefRecord, MemberRefSignature, MethodBodyRecord, MethodId, MethodRecord,
            MethodSpecRecord, Module, ModuleId, ResolutionScope, TypeId, TypeRecord,
            TypeRefRecord,
        },
    },
    Result,
};

/// `AssemblyFlags.PublicKey`: the `PublicKeyOrToken` column holds the full key.
const ASSEMBLY_FLAG_PUBLIC_KEY: u32 = 0x0001;

/// `ldstr` opcode.
const LDSTR: u8 = 0x72;

/// Loads a root module and its transitive references.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    root: PathBuf,
    search_paths: Vec<PathBuf>,
    overrides: FxHashMap<String, Vec<u8>>,
    honour_probing_config: bool,
}

impl ModuleLoader {
    /// Loader for the module at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ModuleLoader {
            root: root.into(),
            search_paths: Vec::new(),
            overrides: FxHashMap::default(),
            honour_probing_config: true,
        }
    }

    /// Adds a directory probed after the root module's directory.
    #[must_use]
    pub fn search_path(mut self, directory: impl Into<PathBuf>) -> Self {
        self.search_paths.push(directory.into());
        self
    }

    /// Supplies the image of assembly `name` from memory instead of probing for it.
    #[must_use]
    pub fn with_module(mut self, name: &str, data: Vec<u8>) -> Self {
        self.overrides.insert(name.to_ascii_lowercase(), data);
        self
    }

    /// Whether `privatePath` entries of `{root}.config` are probed (default: yes).
    #[must_use]
    pub fn honour_probing_config(mut self, enabled: bool) -> Self {
        self.honour_probing_config = enabled;
        self
    }

    /// Loads everything.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] if a referenced assembly cannot be
    /// located, or a parsing error if a module is malformed.
    pub fn load(&self, config: &BuildConfig) -> Result<ModuleSet> {
        let private = self.private_paths()?;
        let probe = ProbePaths::new(&self.root, &private, &self.search_paths);

        let mut arenas = Arenas::default();
        let root_file = File::from_file(&self.root)?;
        let root = read_module(&root_file, Some(&self.root), &mut arenas, config)?;
        log::debug!(
            "Loaded root module '{}' from {}",
            arenas.modules[root.index()].name,
            self.root.display()
        );

        let mut loaded: FxHashSet<String> = FxHashSet::default();
        loaded.insert(arenas.modules[root.index()].name.to_ascii_lowercase());

        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let references: Vec<String> = arenas.modules[current.index()]
                .assembly_refs
                .iter()
                .map(|reference| reference.name.clone())
                .collect();

            for name in references {
                let key = name.to_ascii_lowercase();
                if loaded.contains(&key) {
                    continue;
                }

                let id = if let Some(data) = self.overrides.get(&key) {
                    log::debug!("Using in-memory image for '{}'", name);
                    let file = File::from_mem(data.clone())?;
                    read_module(&file, None, &mut arenas, config)?
                } else {
                    let path = probe.locate(&name)?;
                    let file = File::from_file(&path)?;
                    read_module(&file, Some(&path), &mut arenas, config)?
                };

                loaded.insert(key);
                loaded.insert(arenas.modules[id.index()].name.to_ascii_lowercase());
                queue.push_back(id);
            }
        }

        log::info!(
            "Loaded {} modules with {} types and {} methods",
            arenas.modules.len(),
            arenas.types.len(),
            arenas.methods.len()
        );
        Ok(arenas.into_set(root))
    }

    fn private_paths(&self) -> Result<Vec<String>> {
        if !self.honour_probing_config {
            return Ok(Vec::new());
        }

        let mut config_path = self.root.clone().into_os_string();
        config_path.push(".config");
        let config_path = PathBuf::from(config_path);
        if !config_path.is_file() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let paths = private_paths(&contents)?;
        log::debug!(
            "Probing paths from {}: {:?}",
            config_path.display(),
            paths
        );
        Ok(paths)
    }
}

/// Reads one PE module into `arenas`.
fn read_module(
    file: &File,
    path: Option<&Path>,
    arenas: &mut Arenas,
    config: &BuildConfig,
) -> Result<ModuleId> {
    let (clr_rva, _) = file.clr()?;
    let clr_offset = file.rva_to_offset(clr_rva)?;
    let header = Cor20Header::read(file.data_slice(clr_offset, 72)?)?;

    let metadata_offset = file.rva_to_offset(header.meta_data_rva as usize)?;
    let metadata = file.data_slice(metadata_offset, header.meta_data_size as usize)?;
    let image = MetadataImage::parse(metadata)?;

    let pdb = match path {
        Some(path) if config.read_debug_symbols() => read_pdb(path),
        _ => None,
    };

    let reader = ModuleReader {
        image,
        file,
        id: arenas.next_module(),
        type_base: arenas.types.len() as u32,
        method_base: arenas.methods.len() as u32,
        field_base: arenas.fields.len() as u32,
    };
    reader.read(arenas, path, header.managed_entry_point(), pdb.as_ref())
}

/// Reads `{module}.pdb` if it exists and is a Portable PDB.
fn read_pdb(module: &Path) -> Option<PortablePdb> {
    let pdb_path = module.with_extension("pdb");
    let data = std::fs::read(&pdb_path).ok()?;

    if data.get(0..4) != Some(&CIL_HEADER_MAGIC.to_le_bytes()[..]) {
        log::debug!(
            "{} is not a Portable PDB, skipping debug symbols",
            pdb_path.display()
        );
        return None;
    }

    match PortablePdb::read(&data) {
        Ok(pdb) => Some(pdb),
        Err(error) => {
            log::warn!("Ignoring unreadable {} - {}", pdb_path.display(), error);
            None
        }
    }
}

struct ModuleReader<'a> {
    image: MetadataImage<'a>,
    file: &'a File,
    id: ModuleId,
    type_base: u32,
    method_base: u32,
    field_base: u32,
}

impl<'a> ModuleReader<'a> {
    fn string(&self, index: u32) -> Result<String> {
        Ok(self.image.strings.get(index as usize)?.to_string())
    }

    fn blob(&self, index: u32) -> Result<&'a [u8]> {
        self.image.blobs.get(index as usize)
    }

    fn rows(&self, table: TableId) -> impl Iterator<Item = Result<Row>> + '_ {
        self.image.tables.rows(table)
    }

    fn type_id(&self, rid: u32) -> Result<TypeId> {
        if rid == 0 || rid > self.image.tables.row_count(TableId::TypeDef) {
            return Err(malformed_error!("TypeDef row {} out of range", rid));
        }
        Ok(TypeId(self.type_base + rid - 1))
    }

    fn method_id(&self, rid: u32) -> Result<MethodId> {
        if rid == 0 || rid > self.image.tables.row_count(TableId::MethodDef) {
            return Err(malformed_error!("MethodDef row {} out of range", rid));
        }
        Ok(MethodId(self.method_base + rid - 1))
    }

    fn field_id(&self, rid: u32) -> Result<FieldId> {
        if rid == 0 || rid > self.image.tables.row_count(TableId::Field) {
            return Err(malformed_error!("Field row {} out of range", rid));
        }
        Ok(FieldId(self.field_base + rid - 1))
    }

    /// Follows `FieldPtr`/`MethodPtr` indirection of uncompressed table streams.
    fn indirect(&self, pointer: TableId, rid: u32) -> Result<u32> {
        if self.image.tables.has_table(pointer) {
            Ok(self.image.tables.row(pointer, rid)?.get(0))
        } else {
            Ok(rid)
        }
    }

    /// Members of `TypeDef` row `rid` through list column `column`.
    fn member_rows(
        &self,
        rid: u32,
        column: usize,
        child: TableId,
        pointer: TableId,
    ) -> Result<Vec<u32>> {
        let list_table = if self.image.tables.has_table(pointer) {
            pointer
        } else {
            child
        };
        self.image
            .tables
            .list_range(TableId::TypeDef, rid, column, list_table)?
            .map(|index| self.indirect(pointer, index))
            .collect()
    }

    fn read(
        self,
        arenas: &mut Arenas,
        path: Option<&Path>,
        entry_point: Option<Token>,
        pdb: Option<&PortablePdb>,
    ) -> Result<ModuleId> {
        let mut module = Module {
            id: self.id,
            path: path.map(Path::to_path_buf),
            documents: pdb.map(PortablePdb::documents).unwrap_or_default(),
            ..Module::default()
        };
        self.read_identity(&mut module)?;
        self.read_references(&mut module)?;

        self.read_types(arenas, &mut module)?;
        self.read_fields(arenas, &mut module)?;
        self.read_methods(arenas, &mut module, pdb)?;
        self.read_type_relations(arenas)?;
        self.read_generic_params(arenas)?;
        self.read_attributes(arenas)?;

        for &method in &module.method_defs {
            let Some(body) = &arenas.methods[method.index()].body else {
                continue;
            };
            for instruction in &body.instructions {
                if instruction.prefix != 0 || instruction.opcode != LDSTR {
                    continue;
                }
                if let Some(token) = instruction.token() {
                    if let std::collections::hash_map::Entry::Vacant(slot) =
                        module.user_strings.entry(token.row())
                    {
                        slot.insert(self.image.user_strings.get(token.row() as usize)?);
                    }
                }
            }
        }

        module.entry_point = match entry_point {
            Some(token) if token.is_table(TableId::MethodDef) => Some(self.method_id(token.row())?),
            _ => None,
        };

        log::debug!(
            "Read module '{}': {} types, {} methods, {} references",
            module.name,
            module.type_defs.len(),
            module.method_defs.len(),
            module.assembly_refs.len()
        );
        arenas.modules.push(module);
        Ok(self.id)
    }

    fn read_identity(&self, module: &mut Module) -> Result<()> {
        if self.image.tables.row_count(TableId::Assembly) > 0 {
            let row = self.image.tables.row(TableId::Assembly, 1)?;
            module.name = self.string(row.get(7))?;
            #[allow(clippy::cast_possible_truncation)]
            {
                module.version = [
                    row.get(1) as u16,
                    row.get(2) as u16,
                    row.get(3) as u16,
                    row.get(4) as u16,
                ];
            }
        } else {
            let row = self.image.tables.row(TableId::Module, 1)?;
            let name = self.string(row.get(1))?;
            module.name = Path::new(&name)
                .file_stem()
                .map_or(name.clone(), |stem| stem.to_string_lossy().into_owned());
        }
        Ok(())
    }

    fn read_references(&self, module: &mut Module) -> Result<()> {
        for row in self.rows(TableId::AssemblyRef) {
            let row = row?;
            let flags = row.get(4);
            let key = self.blob(row.get(5))?;
            let public_key_token = if key.is_empty() {
                None
            } else if flags & ASSEMBLY_FLAG_PUBLIC_KEY != 0 {
                Some(public_key_token(key)?)
            } else {
                Some(crate::file::io::read_le::<u64>(key)?)
            };

            #[allow(clippy::cast_possible_truncation)]
            module.assembly_refs.push(AssemblyRefRecord {
                name: self.string(row.get(6))?,
                version: [
                    row.get(0) as u16,
                    row.get(1) as u16,
                    row.get(2) as u16,
                    row.get(3) as u16,
                ],
                public_key_token,
                culture: self.string(row.get(7))?,
            });
        }

        for row in self.rows(TableId::ModuleRef) {
            module.module_refs.push(self.string(row?.get(0))?);
        }

        for row in self.rows(TableId::TypeRef) {
            let row = row?;
            let scope_token = row.token(0);
            let scope = if scope_token.is_null() {
                ResolutionScope::Exported
            } else {
                match scope_token.table_id() {
                    Some(TableId::Module) => ResolutionScope::Module,
                    Some(TableId::ModuleRef) => ResolutionScope::ModuleRef(
                        Module::row(&module.module_refs, scope_token.row())
                            .cloned()
                            .ok_or(crate::Error::InvalidToken(scope_token))?,
                    ),
                    Some(TableId::AssemblyRef) => ResolutionScope::AssemblyRef(scope_token.row()),
                    Some(TableId::TypeRef) => ResolutionScope::TypeRef(scope_token.row()),
                    _ => return Err(crate::Error::InvalidToken(scope_token)),
                }
            };
            module.type_refs.push(TypeRefRecord {
                scope,
                name: self.string(row.get(1))?,
                namespace: self.string(row.get(2))?,
            });
        }

        for row in self.rows(TableId::TypeSpec) {
            module
                .type_specs
                .push(parse_type_spec_signature(self.blob(row?.get(0))?)?);
        }

        for row in self.rows(TableId::MemberRef) {
            let row = row?;
            let blob = self.blob(row.get(2))?;
            let signature = if blob.first() == Some(&0x06) {
                MemberRefSignature::Field(parse_field_signature(blob)?)
            } else {
                MemberRefSignature::Method(parse_method_signature(blob)?)
            };
            module.member_refs.push(MemberRefRecord {
                parent: row.token(0),
                name: self.string(row.get(1))?,
                signature,
            });
        }

        for row in self.rows(TableId::MethodSpec) {
            let row = row?;
            module.method_specs.push(MethodSpecRecord {
                method: row.token(0),
                instantiation: parse_method_spec_signature(self.blob(row.get(1))?)?.generic_args,
            });
        }

        for row in self.rows(TableId::ExportedType) {
            let row = row?;
            module.exported_types.push(ExportedTypeRecord {
                name: self.string(row.get(2))?,
                namespace: self.string(row.get(3))?,
                implementation: row.token(4),
            });
        }

        Ok(())
    }

    fn read_types(&self, arenas: &mut Arenas, module: &mut Module) -> Result<()> {
        for row in self.rows(TableId::TypeDef) {
            let row = row?;
            let id = self.type_id(row.rid)?;
            let extends = row.token(3);

            let fields = self
                .member_rows(row.rid, 4, TableId::Field, TableId::FieldPtr)?
                .into_iter()
                .map(|rid| self.field_id(rid))
                .collect::<Result<Vec<_>>>()?;
            let methods = self
                .member_rows(row.rid, 5, TableId::MethodDef, TableId::MethodPtr)?
                .into_iter()
                .map(|rid| self.method_id(rid))
                .collect::<Result<Vec<_>>>()?;

            arenas.types.push(TypeRecord {
                id,
                module: self.id,
                token: row.self_token(),
                flags: row.get(0),
                name: self.string(row.get(1))?,
                namespace: self.string(row.get(2))?,
                extends: (!extends.is_null()).then_some(extends),
                interfaces: Vec::new(),
                fields,
                methods,
                generic_params: Vec::new(),
                enclosing: None,
                attributes: Vec::new(),
                method_impls: Vec::new(),
                class_layout: None,
            });
            module.type_defs.push(id);
        }
        Ok(())
    }

    /// Declaring type of every member, from the types' member lists.
    fn owners<F>(&self, arenas: &Arenas, members: F, count: u32) -> Vec<Option<TypeId>>
    where
        F: Fn(&TypeRecord) -> Vec<u32>,
    {
        let mut owners = vec![None; count as usize];
        for record in &arenas.types[self.type_base as usize..] {
            for index in members(record) {
                if let Some(slot) = owners.get_mut(index as usize) {
                    *slot = Some(record.id);
                }
            }
        }
        owners
    }

    fn read_fields(&self, arenas: &mut Arenas, module: &mut Module) -> Result<()> {
        let base = self.field_base;
        let count = self.image.tables.row_count(TableId::Field);
        let owners = self.owners(
            arenas,
            |record| record.fields.iter().map(|id| id.0 - base).collect(),
            count,
        );

        for row in self.rows(TableId::Field) {
            let row = row?;
            let id = self.field_id(row.rid)?;
            let Some(declaring_type) = owners[(row.rid - 1) as usize] else {
                return Err(malformed_error!("Field row {} has no declaring type", row.rid));
            };

            arenas.fields.push(FieldRecord {
                id,
                module: self.id,
                declaring_type,
                token: row.self_token(),
                flags: row.get(0),
                name: self.string(row.get(1))?,
                signature: parse_field_signature(self.blob(row.get(2))?)?.base,
                attributes: Vec::new(),
            });
            module.field_defs.push(id);
        }
        Ok(())
    }

    fn read_methods(
        &self,
        arenas: &mut Arenas,
        module: &mut Module,
        pdb: Option<&PortablePdb>,
    ) -> Result<()> {
        let base = self.method_base;
        let count = self.image.tables.row_count(TableId::MethodDef);
        let owners = self.owners(
            arenas,
            |record| record.methods.iter().map(|id| id.0 - base).collect(),
            count,
        );

        for row in self.rows(TableId::MethodDef) {
            let row = row?;
            let id = self.method_id(row.rid)?;
            let Some(declaring_type) = owners[(row.rid - 1) as usize] else {
                return Err(malformed_error!("Method row {} has no declaring type", row.rid));
            };

            #[allow(clippy::cast_possible_truncation)]
            let impl_flags = MethodImplAttributes::from_bits_truncate(row.get(1) as u16);
            #[allow(clippy::cast_possible_truncation)]
            let flags = MethodAttributes::from_bits_truncate(row.get(2) as u16);
            let signature = parse_method_signature(self.blob(row.get(4))?)?;

            let mut param_names = vec![String::new(); signature.params.len()];
            let params = self.image.tables.list_range(
                TableId::MethodDef,
                row.rid,
                5,
                TableId::Param,
            )?;
            for param_rid in params {
                let param = self.image.tables.row(TableId::Param, param_rid)?;
                let sequence = param.get(1) as usize;
                if let Some(slot) = sequence.checked_sub(1).and_then(|i| param_names.get_mut(i)) {
                    *slot = self.string(param.get(2))?;
                }
            }

            let rva = row.get(0);
            let body = if rva == 0 {
                None
            } else {
                Some(self.read_body(rva)?)
            };

            let token = row.self_token();
            arenas.methods.push(MethodRecord {
                id,
                module: self.id,
                declaring_type,
                token,
                name: self.string(row.get(3))?,
                flags,
                impl_flags,
                signature,
                param_names,
                generic_params: Vec::new(),
                body,
                attributes: Vec::new(),
                sequence_points: pdb.and_then(|pdb| pdb.sequence_points(token).cloned()),
            });
            module.method_defs.push(id);
        }
        Ok(())
    }

    fn read_body(&self, rva: u32) -> Result<MethodBodyRecord> {
        let offset = self.file.rva_to_offset(rva as usize)?;
        let data = self
            .file
            .data_slice(offset, self.file.len().saturating_sub(offset))?;
        let body = MethodBody::from(data)?;

        let locals = if body.local_var_sig_token.is_null() {
            Vec::new()
        } else {
            let row = self
                .image
                .tables
                .row(TableId::StandAloneSig, body.local_var_sig_token.row())?;
            parse_local_var_signature(self.blob(row.get(0))?)?
                .locals
                .into_iter()
                .map(|local| local.base)
                .collect()
        };

        let code = body.code(data)?;
        let mut parser = Parser::new(code);
        let instructions = decode_stream(&mut parser, 0)?;

        Ok(MethodBodyRecord {
            max_stack: body.max_stack,
            init_locals: body.is_init_local,
            locals,
            exception_handlers: body.exception_handlers,
            instructions,
            code_size: body.size_code,
        })
    }

    fn type_mut<'r>(&self, arenas: &'r mut Arenas, rid: u32) -> Result<&'r mut TypeRecord> {
        let id = self.type_id(rid)?;
        Ok(&mut arenas.types[id.index()])
    }

    fn read_type_relations(&self, arenas: &mut Arenas) -> Result<()> {
        for row in self.rows(TableId::InterfaceImpl) {
            let row = row?;
            self.type_mut(arenas, row.get(0))?
                .interfaces
                .push(row.token(1));
        }

        for row in self.rows(TableId::NestedClass) {
            let row = row?;
            let enclosing = self.type_id(row.get(1))?;
            self.type_mut(arenas, row.get(0))?.enclosing = Some(enclosing);
        }

        for row in self.rows(TableId::MethodImpl) {
            let row = row?;
            self.type_mut(arenas, row.get(0))?
                .method_impls
                .push((row.token(1), row.token(2)));
        }

        for row in self.rows(TableId::ClassLayout) {
            let row = row?;
            #[allow(clippy::cast_possible_truncation)]
            let packing = row.get(0) as u16;
            self.type_mut(arenas, row.get(2))?.class_layout = Some((packing, row.get(1)));
        }

        Ok(())
    }

    fn read_generic_params(&self, arenas: &mut Arenas) -> Result<()> {
        let mut params = Vec::new();
        for row in self.rows(TableId::GenericParam) {
            let row = row?;
            params.push((row.token(2), row.get(0), self.string(row.get(3))?));
        }
        params.sort_by_key(|(owner, number, _)| (*owner, *number));

        for (owner, _, name) in params {
            match owner.table_id() {
                Some(TableId::TypeDef) => {
                    self.type_mut(arenas, owner.row())?.generic_params.push(name);
                }
                Some(TableId::MethodDef) => {
                    let id = self.method_id(owner.row())?;
                    arenas.methods[id.index()].generic_params.push(name);
                }
                _ => return Err(crate::Error::InvalidToken(owner)),
            }
        }
        Ok(())
    }

    fn read_attributes(&self, arenas: &mut Arenas) -> Result<()> {
        for row in self.rows(TableId::CustomAttribute) {
            let row = row?;
            let parent = row.token(0);
            let attribute = AttributeRecord {
                constructor: row.token(1),
                blob: self.blob(row.get(2))?.to_vec(),
            };

            match parent.table_id() {
                Some(TableId::TypeDef) => {
                    self.type_mut(arenas, parent.row())?.attributes.push(attribute);
                }
                Some(TableId::MethodDef) => {
                    let id = self.method_id(parent.row())?;
                    arenas.methods[id.index()].attributes.push(attribute);
                }
                Some(TableId::Field) => {
                    let id = self.field_id(parent.row())?;
                    arenas.fields[id.index()].attributes.push(attribute);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        metadata::{
            flags::{FieldAttributes, TypeAttributes},
            signatures::{SignatureEncoder, SignatureMethod, TypeSignature},
        },
        model::{GenericContext, TypeSig},
        test::image::ImageWriter,
        Error,
    };

    /// `ExportedType.Flags` of a type forwarder.
    const FORWARDER: u32 = 0x0020_0000;

    fn assembly(image: &mut ImageWriter, name: &str) {
        let module = image.string(&format!("{name}.dll"));
        let mvid = image.guid();
        image.row(TableId::Module, &[0, module, mvid, 0, 0]);
        let name = image.string(name);
        image.row(TableId::Assembly, &[0x8004, 1, 2, 3, 4, 0, 0, name, 0]);
    }

    fn assembly_ref(image: &mut ImageWriter, name: &str) -> Token {
        let name = image.string(name);
        image.row(TableId::AssemblyRef, &[1, 0, 0, 0, 0, 0, name, 0, 0])
    }

    /// `App` with `Program.Main(string[] args)` reading a static `Lib.Widget` field, the
    /// widget type referenced through `via`.
    fn app(via: &str) -> Vec<u8> {
        let mut image = ImageWriter::new(false);
        assembly(&mut image, "App");
        let scope = assembly_ref(&mut image, via);
        let widget_name = image.string("Widget");
        let lib = image.string("Lib");
        let widget = image.row(TableId::TypeRef, &[scope.value(), widget_name, lib]);

        let program_name = image.string("Program");
        let namespace = image.string("App");
        image.row(
            TableId::TypeDef,
            &[TypeAttributes::PUBLIC, program_name, namespace, 0, 1, 1],
        );

        let field_sig = SignatureEncoder::field(&TypeSignature::Class(widget)).unwrap();
        let field_name = image.string("widget");
        let field_sig = image.blob(&field_sig).unwrap();
        image.row(
            TableId::Field,
            &[
                FieldAttributes::PUBLIC | FieldAttributes::STATIC,
                field_name,
                field_sig,
            ],
        );

        let hello = image.user_string("hello").unwrap();
        let mut code = vec![LDSTR];
        code.extend_from_slice(&hello.value().to_le_bytes());
        code.extend_from_slice(&[0x26, 0x2A]);
        let rva = image.body(&code);

        let signature = SignatureEncoder::method(&SignatureMethod {
            return_type: TypeSignature::Void,
            params: vec![TypeSignature::SzArray(Box::new(TypeSignature::String))],
            ..SignatureMethod::default()
        })
        .unwrap();
        let main_name = image.string("Main");
        let signature = image.blob(&signature).unwrap();
        let flags =
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG;
        let main = image.row(
            TableId::MethodDef,
            &[rva, 0, u32::from(flags.bits()), main_name, signature, 1],
        );
        let args = image.string("args");
        image.row(TableId::Param, &[0, 1, args]);
        image.entry_point(main);
        image.finish().unwrap()
    }

    /// `Facade` forwarding `Lib.Widget` to `Impl`.
    fn facade() -> Vec<u8> {
        let mut image = ImageWriter::new(true);
        assembly(&mut image, "Facade");
        let target = assembly_ref(&mut image, "Impl");
        let name = image.string("Widget");
        let namespace = image.string("Lib");
        image.row(
            TableId::ExportedType,
            &[FORWARDER, 0, name, namespace, target.value()],
        );
        image.finish().unwrap()
    }

    /// `Impl` defining `Lib.Widget`.
    fn implementation() -> Vec<u8> {
        let mut image = ImageWriter::new(true);
        assembly(&mut image, "Impl");
        let name = image.string("Widget");
        let namespace = image.string("Lib");
        image.row(
            TableId::TypeDef,
            &[TypeAttributes::PUBLIC | TypeAttributes::SEALED, name, namespace, 0, 1, 1],
        );
        image.finish().unwrap()
    }

    fn write_root(test: &str, image: &[u8]) -> PathBuf {
        let directory =
            std::env::temp_dir().join(format!("dotnative-loader-{}-{test}", std::process::id()));
        std::fs::create_dir_all(&directory).unwrap();
        let path = directory.join("App.exe");
        std::fs::write(&path, image).unwrap();
        path
    }

    #[test]
    fn loads_references_and_forwarders() {
        let root = write_root("forward", &app("Facade"));
        let set = ModuleLoader::new(&root)
            .with_module("Facade", facade())
            .with_module("impl", implementation())
            .load(&BuildConfig::default())
            .unwrap();
        std::fs::remove_dir_all(root.parent().unwrap()).ok();

        let names: Vec<&str> = set.modules().iter().map(|module| module.name.as_str()).collect();
        assert_eq!(names, ["App", "Facade", "Impl"]);
        let app = set.root_module();
        assert_eq!(app.version, [1, 2, 3, 4]);
        assert_eq!(app.path.as_deref(), Some(root.as_path()));
        assert_eq!(app.assembly_refs[0].name, "Facade");
        assert_eq!(set.module_by_name("facade").unwrap().exported_types.len(), 1);

        let program = set.find_type_in(app.id, "App.Program").unwrap();
        let field = set.field(set.find_field(program, "widget").unwrap());
        let ty = set
            .resolve_signature(app.id, &field.signature, &GenericContext::empty())
            .unwrap();
        let widget = set.find_type("Lib.Widget").unwrap();
        assert_eq!(ty, TypeSig::Named(widget, Vec::new()));
        assert_eq!(set.module(set.type_record(widget).module).name, "Impl");
    }

    #[test]
    fn entry_point_and_bodies() {
        let root = write_root("entry", &app("Impl"));
        let set = ModuleSet::load(&root, &BuildConfig::default());
        std::fs::remove_dir_all(root.parent().unwrap()).ok();
        // Impl is not next to the root
        assert!(matches!(set, Err(Error::ModuleNotFound { ref name, .. }) if name == "Impl"));

        let root = write_root("entry", &app("Impl"));
        let set = ModuleLoader::new(&root)
            .with_module("Impl", implementation())
            .load(&BuildConfig::default())
            .unwrap();
        std::fs::remove_dir_all(root.parent().unwrap()).ok();

        let main = set.entry_point().unwrap();
        let record = set.method(main);
        assert_eq!(record.name, "Main");
        assert!(record.is_static());
        assert_eq!(record.param_names, ["args"]);
        assert_eq!(record.token, Token::new(0x0600_0001));

        let body = record.body.as_ref().unwrap();
        assert_eq!(body.code_size, 7);
        assert_eq!(body.instructions.len(), 3);
        let literal = body.instructions[0].token().unwrap();
        assert_eq!(set.user_string(record.module, literal).unwrap(), "hello");

        let widget = set.find_type("Lib.Widget").unwrap();
        assert!(set.type_record(widget).is_sealed());
        assert_eq!(set.module(set.type_record(widget).module).name, "Impl");
    }

    #[test]
    fn missing_reference_is_reported() {
        let root = write_root("missing", &app("Nowhere"));
        let result = ModuleSet::load(&root, &BuildConfig::default());
        std::fs::remove_dir_all(root.parent().unwrap()).ok();

        match result {
            Err(Error::ModuleNotFound { name, searched }) => {
                assert_eq!(name, "Nowhere");
                assert!(searched.iter().any(|path| path.ends_with("Nowhere.dll")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn libraries_have_no_entry_point() {
        let directory =
            std::env::temp_dir().join(format!("dotnative-loader-{}-library", std::process::id()));
        std::fs::create_dir_all(&directory).unwrap();
        let path = directory.join("Impl.dll");
        std::fs::write(&path, implementation()).unwrap();
        let set = ModuleSet::load(&path, &BuildConfig::default()).unwrap();
        std::fs::remove_dir_all(&directory).ok();

        assert_eq!(set.modules().len(), 1);
        assert_eq!(set.root_module().name, "Impl");
        assert_eq!(set.entry_point(), None);
        assert_eq!(set.root_module().type_defs.len(), 1);
    }
}
