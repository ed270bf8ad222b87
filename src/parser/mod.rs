// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! The scene-file parser. One incremental pass over the token stream builds
//! nodes against the active scope chain; route declarations are collected
//! per scope frame and resolved when the frame closes, so forward references
//! within a body are admissible.

pub mod lexer;
pub mod value;

use crate::{
    component::{ComponentRegistry, ProfileRegistry},
    error::SceneError,
    field::{FieldKind, FieldValue},
    node::{
        interface::{parse_field_kind, InterfaceAccess, InterfaceDecl, InterfaceSet},
        metatype::{InitialValues, NodeType},
        registry::MetatypeRegistry,
        Node,
    },
    parser::{
        lexer::{Lexer, Token, TokenKind},
        value::err_at,
    },
    proto::{ExternProtoMetatype, IsMapping, ProtoMetatype},
    scope::Scope,
    vrml97::behavior::ScriptBehavior,
};
use std::{collections::BTreeMap, sync::Arc};
use welt_core::{
    io::ResourceHandle,
    log::Log,
    uri::{effective_base, Uri},
};

/// The two scene-text dialects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// Compact 1997-era syntax.
    Vrml97,
    /// Extended syntax with profile/component selection.
    X3dVrml,
}

/// Maps a media-type hint to a dialect.
pub fn dialect_for_media_type(media_type: &str) -> Result<Dialect, SceneError> {
    match media_type {
        "model/vrml" | "x-world/x-vrml" => Ok(Dialect::Vrml97),
        "model/x3d-vrml" => Ok(Dialect::X3dVrml),
        other => Err(SceneError::BadMediaType {
            media_type: other.to_owned(),
        }),
    }
}

/// Receives externproto stubs whose bodies must be fetched in the
/// background. The engine implements this on top of its worker pool.
pub trait ExternProtoFetcher {
    fn submit(&self, stub: Arc<ExternProtoMetatype>);
}

/// What the parser needs from the engine.
pub struct SceneContext<'a> {
    pub metatypes: &'a MetatypeRegistry,
    pub components: &'a ComponentRegistry,
    pub profiles: &'a ProfileRegistry,
    /// The world URL used as the fallback base for anonymous streams.
    pub world_url: String,
    pub fetcher: Option<&'a dyn ExternProtoFetcher>,
}

/// A successfully parsed scene.
pub struct ParseOutput {
    pub roots: Vec<Node>,
    /// Extended-dialect META map; empty for the compact dialect.
    pub metadata: BTreeMap<String, String>,
    /// The root scope holding the world's type and DEF-name bindings.
    pub scope: Scope,
}

impl std::fmt::Debug for ParseOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseOutput")
            .field("roots_len", &self.roots.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Parses a scene stream into a node graph. Parse warnings are reported on
/// the log; errors abort the parse after a best-effort cleanup of the frame
/// stack.
pub fn parse_scene(
    stream: ResourceHandle,
    base_uri: &str,
    media_type: &str,
    ctx: &SceneContext<'_>,
) -> Result<ParseOutput, SceneError> {
    let dialect = dialect_for_media_type(media_type)?;
    let bytes = stream.read_to_end()?;

    let stream_uri = Uri::parse(base_uri).map_err(|_| SceneError::InvalidUrl {
        raw: base_uri.to_owned(),
    })?;
    let base = effective_base(&stream_uri, &ctx.world_url);

    let first_line = bytes
        .split(|byte| *byte == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim_end().to_owned())
        .unwrap_or_default();

    let mut parser = Parser {
        lexer: Lexer::new(&bytes),
        uri: base_uri.to_owned(),
        base,
        dialect,
        first_line,
        ctx,
        frames: Vec::new(),
        open_nodes: Vec::new(),
        metadata: BTreeMap::new(),
        roots: Vec::new(),
    };

    match parser.run() {
        Ok(scope) => Ok(ParseOutput {
            roots: std::mem::take(&mut parser.roots),
            metadata: std::mem::take(&mut parser.metadata),
            scope,
        }),
        Err(error) => {
            parser.salvage(&error);
            Err(error)
        }
    }
}

struct PendingRoute {
    src: String,
    event_out: String,
    dst: String,
    event_in: String,
    line: u32,
    col: u32,
}

struct ProtoFrame {
    interfaces: InterfaceSet,
    is_entries: Vec<IsMapping>,
}

struct Frame {
    scope: Scope,
    proto: Option<ProtoFrame>,
    routes: Vec<PendingRoute>,
}

/// A node literal currently being populated; tracked for Script
/// self-references and for salvage accounting.
struct OpenNode {
    def_name: Option<String>,
    is_script: bool,
    wants_self_ref: bool,
}

struct Parser<'a, 'ctx> {
    lexer: Lexer<'a>,
    uri: String,
    base: Uri,
    dialect: Dialect,
    first_line: String,
    ctx: &'ctx SceneContext<'ctx>,
    frames: Vec<Frame>,
    open_nodes: Vec<OpenNode>,
    metadata: BTreeMap<String, String>,
    roots: Vec<Node>,
}

impl Parser<'_, '_> {
    fn run(&mut self) -> Result<Scope, SceneError> {
        let profile_name = self.check_header()?;
        let Some(profile) = self.ctx.profiles.find(&profile_name) else {
            let (line, col) = self.lexer.location();
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("unknown profile {profile_name}"),
            ));
        };
        let root_scope =
            profile.create_root_scope(self.ctx.components, self.ctx.metatypes, &self.uri);
        self.frames.push(Frame {
            scope: root_scope.clone(),
            proto: None,
            routes: Vec::new(),
        });

        while self.peek()?.kind != TokenKind::Eof {
            if let Some(node) = self.parse_statement()? {
                self.roots.push(node);
            }
        }

        let frame = self.frames.pop().expect("root frame");
        self.resolve_routes(&frame)?;
        Ok(root_scope)
    }

    /// Validates the header magic and, for the extended dialect, consumes
    /// the PROFILE statement. Returns the profile name to apply.
    fn check_header(&mut self) -> Result<String, SceneError> {
        match self.dialect {
            Dialect::Vrml97 => {
                if !self.first_line.starts_with("#VRML V2.0 utf8") {
                    return Err(err_at(
                        &self.uri,
                        1,
                        1,
                        "expected header \"#VRML V2.0 utf8\"",
                    ));
                }
                Ok("VRML97".to_owned())
            }
            Dialect::X3dVrml => {
                if !(self.first_line.starts_with("#X3D V3") && self.first_line.contains("utf8")) {
                    return Err(err_at(&self.uri, 1, 1, "expected header \"#X3D V3.x utf8\""));
                }
                let (keyword, line, col) = self.expect_ident()?;
                if keyword != "PROFILE" {
                    return Err(err_at(&self.uri, line, col, "expected a PROFILE statement"));
                }
                Ok(self.expect_ident()?.0)
            }
        }
    }

    fn peek(&mut self) -> Result<Token, SceneError> {
        self.lexer
            .peek()
            .map_err(|e| err_at(&self.uri, e.line, e.col, e.message))
    }

    fn next(&mut self) -> Result<Token, SceneError> {
        self.lexer
            .next()
            .map_err(|e| err_at(&self.uri, e.line, e.col, e.message))
    }

    fn expect_ident(&mut self) -> Result<(String, u32, u32), SceneError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Ident(id) => Ok((id, token.line, token.col)),
            other => Err(err_at(
                &self.uri,
                token.line,
                token.col,
                format!("expected an identifier, found {}", other.describe()),
            )),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), SceneError> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(err_at(
                &self.uri,
                token.line,
                token.col,
                format!(
                    "expected {}, found {}",
                    kind.describe(),
                    token.kind.describe()
                ),
            ))
        }
    }

    fn current_scope(&self) -> Scope {
        self.frames
            .last()
            .expect("frame stack never empty")
            .scope
            .clone()
    }

    /// One top-level or body statement. Returns a node for node-producing
    /// statements.
    fn parse_statement(&mut self) -> Result<Option<Node>, SceneError> {
        let token = self.peek()?;
        let TokenKind::Ident(keyword) = &token.kind else {
            return Err(err_at(
                &self.uri,
                token.line,
                token.col,
                format!("expected a statement, found {}", token.kind.describe()),
            ));
        };

        match keyword.as_str() {
            "PROTO" => {
                self.next()?;
                self.parse_proto()?;
                Ok(None)
            }
            "EXTERNPROTO" => {
                self.next()?;
                self.parse_externproto()?;
                Ok(None)
            }
            "ROUTE" => {
                self.next()?;
                self.parse_route_decl()?;
                Ok(None)
            }
            "USE" => {
                self.next()?;
                Ok(self.parse_use()?)
            }
            "COMPONENT" if self.dialect == Dialect::X3dVrml => {
                self.next()?;
                self.parse_component_statement()?;
                Ok(None)
            }
            "META" if self.dialect == Dialect::X3dVrml => {
                self.next()?;
                let key = self.parse_string_token()?;
                let value = self.parse_string_token()?;
                self.metadata.insert(key, value);
                Ok(None)
            }
            "IMPORT" if self.dialect == Dialect::X3dVrml => {
                self.next()?;
                self.parse_import()?;
                Ok(None)
            }
            "EXPORT" if self.dialect == Dialect::X3dVrml => {
                self.next()?;
                let (name, line, col) = self.expect_ident()?;
                let exported = if self.peek_keyword("AS")? {
                    self.next()?;
                    self.expect_ident()?.0
                } else {
                    name.clone()
                };
                if self.current_scope().find_node(&name).is_none() {
                    return Err(err_at(
                        &self.uri,
                        line,
                        col,
                        format!("EXPORT of unknown node name {name}"),
                    ));
                }
                self.metadata
                    .insert(format!("EXPORT:{exported}"), name);
                Ok(None)
            }
            _ => Ok(Some(self.parse_node()?)),
        }
    }

    fn peek_keyword(&mut self, keyword: &str) -> Result<bool, SceneError> {
        Ok(matches!(&self.peek()?.kind, TokenKind::Ident(id) if id == keyword))
    }

    fn parse_string_token(&mut self) -> Result<String, SceneError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Str(value) => Ok(value),
            other => Err(err_at(
                &self.uri,
                token.line,
                token.col,
                format!("expected a string literal, found {}", other.describe()),
            )),
        }
    }

    fn parse_component_statement(&mut self) -> Result<(), SceneError> {
        let (name, line, col) = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let level_token = self.next()?;
        let TokenKind::Number(level_text) = &level_token.kind else {
            return Err(err_at(
                &self.uri,
                level_token.line,
                level_token.col,
                "expected a component level",
            ));
        };
        let level: u32 = level_text.parse().map_err(|_| {
            err_at(
                &self.uri,
                level_token.line,
                level_token.col,
                format!("malformed component level {level_text:?}"),
            )
        })?;
        let Some(component) = self.ctx.components.find(&name) else {
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("unknown component {name}"),
            ));
        };
        component.add_to_scope(self.ctx.metatypes, &self.current_scope(), level)
    }

    fn parse_import(&mut self) -> Result<(), SceneError> {
        let (inline_name, ..) = self.expect_ident()?;
        self.expect(TokenKind::Period)?;
        let (exported, ..) = self.expect_ident()?;
        let local = if self.peek_keyword("AS")? {
            self.next()?;
            self.expect_ident()?.0
        } else {
            exported.clone()
        };
        // Cross-world name import needs the Inline's content, which loads
        // through the resource layer; the declaration is recorded so the
        // embedder can wire it up after the Inline resolves.
        Log::warn(format!(
            "{}: IMPORT {inline_name}.{exported} AS {local} recorded but not resolved (Inline not loaded at parse time).",
            self.uri
        ));
        self.metadata
            .insert(format!("IMPORT:{local}"), format!("{inline_name}.{exported}"));
        Ok(())
    }

    /// USE: resolves a name in the current scope; inside a Script body the
    /// script's own DEF name resolves to the distinguished self-reference.
    fn parse_use(&mut self) -> Result<Option<Node>, SceneError> {
        let (name, line, col) = self.expect_ident()?;
        if let Some(node) = self.current_scope().find_node(&name) {
            return Ok(Some(node));
        }
        if let Some(open) = self
            .open_nodes
            .iter_mut()
            .rev()
            .find(|open| open.def_name.as_deref() == Some(name.as_str()))
        {
            if open.is_script {
                open.wants_self_ref = true;
                return Ok(None);
            }
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("recursive USE of {name} while its node is still being built"),
            ));
        }
        Err(err_at(
            &self.uri,
            line,
            col,
            format!("USE of unknown node name {name}"),
        ))
    }

    /// `[DEF name] TypeId { ... }`.
    fn parse_node(&mut self) -> Result<Node, SceneError> {
        let mut def_name = None;
        let (mut type_name, mut line, mut col) = self.expect_ident()?;
        if type_name == "DEF" {
            def_name = Some(self.expect_ident()?.0);
            (type_name, line, col) = self.expect_ident()?;
        }

        let Some(ty) = self.current_scope().find_type(&type_name) else {
            if self.ctx.components.any_component_provides(&type_name) {
                return Err(SceneError::UnsupportedInterface {
                    node_type: type_name,
                    requested: "(node type outside the active profile)".to_owned(),
                });
            }
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("unknown node type {type_name}"),
            ));
        };

        let is_script = type_name == "Script";
        self.open_nodes.push(OpenNode {
            def_name: def_name.clone(),
            is_script,
            wants_self_ref: false,
        });

        let result = self.parse_node_body(&ty, is_script);
        let open = self.open_nodes.pop().expect("pushed above");
        let (init, extra_interfaces, is_fields) = result?;

        let ty = if extra_interfaces.is_empty() {
            ty
        } else {
            let mut merged = ty.interfaces().clone();
            for decl in extra_interfaces.iter() {
                merged.add(decl.clone());
            }
            NodeType::new(ty.metatype().clone(), type_name.clone(), merged)?
        };

        let node = ty.create_node(&self.current_scope(), init)?;

        if let Some(name) = def_name {
            node.set_name(name.clone());
            self.current_scope().add_node(name, &node);
        }
        if open.wants_self_ref {
            node.with_behavior_mut(|behavior| {
                if let Some(script) = behavior.as_any_mut().downcast_mut::<ScriptBehavior>() {
                    script.self_ref = Some(node.downgrade());
                }
            });
        }
        if let Some(proto) = self
            .frames
            .last_mut()
            .and_then(|frame| frame.proto.as_mut())
        {
            for (field_id, interface_id) in is_fields {
                proto.is_entries.push(IsMapping {
                    interface_id,
                    node: node.clone(),
                    node_interface: field_id,
                });
            }
        }
        Ok(node)
    }

    /// Parses `{ field-or-interface... }`. Returns the initial values, extra
    /// (Script) interfaces, and the IS-mapped field list.
    #[allow(clippy::type_complexity)]
    fn parse_node_body(
        &mut self,
        ty: &NodeType,
        is_script: bool,
    ) -> Result<(InitialValues, Vec<InterfaceDecl>, Vec<(String, String)>), SceneError> {
        self.expect(TokenKind::LBrace)?;

        let mut init = InitialValues::new();
        let mut extra = Vec::new();
        let mut is_fields: Vec<(String, String)> = Vec::new();

        loop {
            let token = self.peek()?;
            match &token.kind {
                TokenKind::RBrace => {
                    self.next()?;
                    break;
                }
                TokenKind::Ident(keyword) => match keyword.as_str() {
                    "ROUTE" => {
                        self.next()?;
                        self.parse_route_decl()?;
                    }
                    "PROTO" => {
                        self.next()?;
                        self.parse_proto()?;
                    }
                    "EXTERNPROTO" => {
                        self.next()?;
                        self.parse_externproto()?;
                    }
                    _ if is_script && self.is_access_keyword(keyword) => {
                        let decl = self.parse_interface_decl(true)?;
                        if let Some(interface_id) = self.try_parse_is()? {
                            self.check_is_mapping(&decl, &interface_id, token.line, token.col)?;
                            is_fields.push((decl.id.clone(), interface_id.clone()));
                            if let Some(default) =
                                self.proto_interface_default(&interface_id, &decl)
                            {
                                init.insert(decl.id.clone(), default);
                            }
                        }
                        extra.push(decl);
                    }
                    _ => {
                        let (field_id, line, col) = self.expect_ident()?;
                        let Some(decl) = ty
                            .interfaces()
                            .find(&field_id)
                            .cloned()
                            .or_else(|| extra.iter().find(|d| d.id == field_id).cloned())
                        else {
                            return Err(err_at(
                                &self.uri,
                                line,
                                col,
                                format!(
                                    "node type {} has no field {field_id}",
                                    ty.local_id()
                                ),
                            ));
                        };

                        if let Some(interface_id) = self.try_parse_is()? {
                            self.check_is_mapping(&decl, &interface_id, line, col)?;
                            is_fields.push((decl.id.clone(), interface_id.clone()));
                            if let Some(default) =
                                self.proto_interface_default(&interface_id, &decl)
                            {
                                init.insert(decl.id.clone(), default);
                            }
                            continue;
                        }

                        if !matches!(
                            decl.access,
                            InterfaceAccess::Field | InterfaceAccess::ExposedField
                        ) {
                            return Err(err_at(
                                &self.uri,
                                line,
                                col,
                                format!("{field_id} is not a field and cannot take a value"),
                            ));
                        }
                        let value = self.parse_field_value(decl.kind)?;
                        init.insert(decl.id.clone(), value);
                    }
                },
                other => {
                    return Err(err_at(
                        &self.uri,
                        token.line,
                        token.col,
                        format!("expected a field or '}}', found {}", other.describe()),
                    ));
                }
            }
        }

        Ok((init, extra, is_fields))
    }

    /// Consumes `IS interface-id` if it is next.
    fn try_parse_is(&mut self) -> Result<Option<String>, SceneError> {
        if self.peek_keyword("IS")? {
            self.next()?;
            Ok(Some(self.expect_ident()?.0))
        } else {
            Ok(None)
        }
    }

    fn check_is_mapping(
        &mut self,
        field_decl: &InterfaceDecl,
        interface_id: &str,
        line: u32,
        col: u32,
    ) -> Result<(), SceneError> {
        let Some(proto) = self.frames.last().and_then(|frame| frame.proto.as_ref()) else {
            return Err(err_at(
                &self.uri,
                line,
                col,
                "IS mapping outside a PROTO body",
            ));
        };
        let Some(interface) = proto.interfaces.find(interface_id) else {
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("IS references undeclared interface {interface_id}"),
            ));
        };
        if interface.kind != field_decl.kind {
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!(
                    "IS kind mismatch: {} is {}, {} is {}",
                    field_decl.id, field_decl.kind, interface_id, interface.kind
                ),
            ));
        }
        Ok(())
    }

    /// The PROTO-declared default for an IS-mapped field, when both sides
    /// carry storage.
    fn proto_interface_default(
        &self,
        interface_id: &str,
        field_decl: &InterfaceDecl,
    ) -> Option<FieldValue> {
        if !field_decl.access.has_storage() {
            return None;
        }
        let proto = self.frames.last()?.proto.as_ref()?;
        let interface = proto.interfaces.find(interface_id)?;
        if interface.access.has_storage() {
            Some(interface.default.clone())
        } else {
            None
        }
    }

    fn is_access_keyword(&self, keyword: &str) -> bool {
        InterfaceAccess::from_extended_keyword(keyword).is_some()
            || matches!(
                keyword,
                "eventIn" | "eventOut" | "field" | "exposedField"
            )
    }

    /// `access-kind value-kind id` with a deprecation warning for the legacy
    /// keywords in the extended dialect.
    fn parse_access_kind(&mut self) -> Result<InterfaceAccess, SceneError> {
        let (keyword, line, col) = self.expect_ident()?;
        if let Some(access) = InterfaceAccess::from_extended_keyword(&keyword) {
            return Ok(access);
        }
        let access = keyword.parse::<InterfaceAccess>().map_err(|_| {
            err_at(
                &self.uri,
                line,
                col,
                format!("expected an access kind, found {keyword:?}"),
            )
        })?;
        if self.dialect == Dialect::X3dVrml {
            Log::warn(format!(
                "{}:{line}:{col}: keyword {keyword} is deprecated; use {}.",
                self.uri,
                access.extended_keyword()
            ));
        }
        Ok(access)
    }

    /// One interface declaration, as used by PROTO/EXTERNPROTO declaration
    /// lists and Script bodies. `with_defaults` selects whether field and
    /// exposed-field declarations carry a default value.
    fn parse_interface_decl(&mut self, with_defaults: bool) -> Result<InterfaceDecl, SceneError> {
        let access = self.parse_access_kind()?;
        let (kind_name, line, col) = self.expect_ident()?;
        let Some(kind) = parse_field_kind(&kind_name) else {
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("unknown field kind {kind_name}"),
            ));
        };
        let (id, ..) = self.expect_ident()?;
        let mut decl = InterfaceDecl::new(access, kind, id);
        if with_defaults
            && matches!(
                access,
                InterfaceAccess::Field | InterfaceAccess::ExposedField
            )
            && !self.peek_keyword("IS")?
        {
            let default = self.parse_field_value(kind)?;
            decl = decl.with_default(default);
        }
        Ok(decl)
    }

    /// A field value of the given kind; node kinds recurse into the node
    /// grammar.
    fn parse_field_value(&mut self, kind: FieldKind) -> Result<FieldValue, SceneError> {
        match kind {
            FieldKind::SFNode => Ok(FieldValue::SfNode(self.parse_sf_node()?)),
            FieldKind::MFNode => {
                let mut nodes = Vec::new();
                if self.peek()?.kind == TokenKind::LBracket {
                    self.next()?;
                    loop {
                        let token = self.peek()?;
                        match token.kind {
                            TokenKind::RBracket => {
                                self.next()?;
                                break;
                            }
                            TokenKind::Eof => {
                                return Err(err_at(
                                    &self.uri,
                                    token.line,
                                    token.col,
                                    "unterminated node list",
                                ));
                            }
                            _ => nodes.extend(self.parse_sf_node()?),
                        }
                    }
                } else {
                    nodes.extend(self.parse_sf_node()?);
                }
                Ok(FieldValue::MfNode(nodes))
            }
            other => {
                let value = value::parse_value(other, &mut self.lexer, &self.uri)?;
                Ok(value)
            }
        }
    }

    /// `NULL`, `USE name`, or a node literal.
    fn parse_sf_node(&mut self) -> Result<Option<Node>, SceneError> {
        if self.peek_keyword("NULL")? {
            self.next()?;
            return Ok(None);
        }
        if self.peek_keyword("USE")? {
            self.next()?;
            return self.parse_use();
        }
        self.parse_node().map(Some)
    }

    /// `PROTO Name [ declarations ] { body }`.
    fn parse_proto(&mut self) -> Result<(), SceneError> {
        let (name, name_line, name_col) = self.expect_ident()?;
        self.expect(TokenKind::LBracket)?;

        let mut interfaces = InterfaceSet::new();
        loop {
            let token = self.peek()?;
            match &token.kind {
                TokenKind::RBracket => {
                    self.next()?;
                    break;
                }
                TokenKind::Ident(_) => {
                    // Node-typed defaults open their own scope frame so
                    // DEF names inside them stay local.
                    let decl = self.parse_proto_interface_decl()?;
                    interfaces.add(decl);
                }
                other => {
                    return Err(err_at(
                        &self.uri,
                        token.line,
                        token.col,
                        format!(
                            "expected an interface declaration or ']', found {}",
                            other.describe()
                        ),
                    ));
                }
            }
        }

        let proto_scope = Scope::new(
            format!("{}#{name}", self.uri),
            Some(self.current_scope()),
        );
        self.frames.push(Frame {
            scope: proto_scope,
            proto: Some(ProtoFrame {
                interfaces: interfaces.clone(),
                is_entries: Vec::new(),
            }),
            routes: Vec::new(),
        });

        let body = self.parse_proto_body();
        let frame = self.frames.pop().expect("proto frame");
        let body = body?;
        self.resolve_routes(&frame)?;

        if body.is_empty() {
            return Err(err_at(
                &self.uri,
                name_line,
                name_col,
                format!("PROTO {name} has an empty body"),
            ));
        }

        let metatype_id = format!("{}#{name}", self.uri);
        let proto = Arc::new(ProtoMetatype::new(
            metatype_id,
            interfaces.clone(),
            body,
            frame.proto.expect("pushed above").is_entries,
        ));
        self.ctx.metatypes.register(proto.clone());
        let ty = NodeType::new(proto, name, interfaces)?;
        self.current_scope().add_type(ty);
        Ok(())
    }

    fn parse_proto_body(&mut self) -> Result<Vec<Node>, SceneError> {
        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        loop {
            let token = self.peek()?;
            match token.kind {
                TokenKind::RBrace => {
                    self.next()?;
                    return Ok(body);
                }
                TokenKind::Eof => {
                    return Err(err_at(
                        &self.uri,
                        token.line,
                        token.col,
                        "unterminated PROTO body",
                    ));
                }
                _ => {
                    if let Some(node) = self.parse_statement()? {
                        body.push(node);
                    }
                }
            }
        }
    }

    /// An interface declaration in a PROTO declaration list; node-typed
    /// defaults get their own scope frame so DEF names inside them stay
    /// local.
    fn parse_proto_interface_decl(&mut self) -> Result<InterfaceDecl, SceneError> {
        let access = self.parse_access_kind()?;
        let (kind_name, line, col) = self.expect_ident()?;
        let Some(kind) = parse_field_kind(&kind_name) else {
            return Err(err_at(
                &self.uri,
                line,
                col,
                format!("unknown field kind {kind_name}"),
            ));
        };
        let (id, ..) = self.expect_ident()?;
        let mut decl = InterfaceDecl::new(access, kind, id);
        if matches!(
            access,
            InterfaceAccess::Field | InterfaceAccess::ExposedField
        ) {
            if kind.is_node() {
                let default_scope = Scope::new(
                    format!("{}#default", self.current_scope().id()),
                    Some(self.current_scope()),
                );
                self.frames.push(Frame {
                    scope: default_scope,
                    proto: None,
                    routes: Vec::new(),
                });
                let value = self.parse_field_value(kind);
                let frame = self.frames.pop().expect("default frame");
                let value = value?;
                self.resolve_routes(&frame)?;
                decl = decl.with_default(value);
            } else {
                let value = self.parse_field_value(kind)?;
                decl = decl.with_default(value);
            }
        }
        Ok(decl)
    }

    /// `EXTERNPROTO Name [ declarations ] url-list`.
    fn parse_externproto(&mut self) -> Result<(), SceneError> {
        let (name, ..) = self.expect_ident()?;
        self.expect(TokenKind::LBracket)?;
        let mut interfaces = InterfaceSet::new();
        loop {
            let token = self.peek()?;
            match &token.kind {
                TokenKind::RBracket => {
                    self.next()?;
                    break;
                }
                TokenKind::Ident(_) => {
                    interfaces.add(self.parse_interface_decl(false)?);
                }
                other => {
                    return Err(err_at(
                        &self.uri,
                        token.line,
                        token.col,
                        format!(
                            "expected an interface declaration or ']', found {}",
                            other.describe()
                        ),
                    ));
                }
            }
        }

        let urls = match self.parse_field_value(FieldKind::MFString)? {
            FieldValue::MfString(urls) => urls,
            _ => unreachable!("MFString parse returns MfString"),
        };

        let mut resolved = Vec::with_capacity(urls.len());
        for url in &urls {
            let parsed = Uri::parse(url).map_err(|_| SceneError::InvalidUrl {
                raw: url.clone(),
            })?;
            resolved.push(parsed.resolve_against(&self.base).to_string());
        }

        // First URL that names an already-registered metatype wins.
        for url in &resolved {
            if let Some(metatype) = self.ctx.metatypes.find(url) {
                metatype.validate_interfaces(&name, &interfaces)?;
                let ty = NodeType::new(metatype, name.clone(), interfaces.clone())?;
                self.current_scope().add_type(ty);
                return Ok(());
            }
        }

        let id = resolved
            .first()
            .cloned()
            .unwrap_or_else(|| format!("{}#{name}", self.uri));
        let stub = Arc::new(ExternProtoMetatype::new(
            id.clone(),
            interfaces.clone(),
            resolved.clone(),
        ));
        self.ctx.metatypes.register(stub.clone());
        for url in &resolved {
            self.ctx.metatypes.register_alias(url, &id);
        }
        if let Some(fetcher) = self.ctx.fetcher {
            fetcher.submit(stub.clone());
        } else if !resolved.is_empty() {
            Log::warn(format!(
                "{}: EXTERNPROTO {name} left unresolved (no fetcher available).",
                self.uri
            ));
        }
        let ty = NodeType::new(stub, name, interfaces)?;
        self.current_scope().add_type(ty);
        Ok(())
    }

    /// `ROUTE src.event-out TO dst.event-in`; resolution is deferred to the
    /// end of the enclosing frame.
    fn parse_route_decl(&mut self) -> Result<(), SceneError> {
        let (src, line, col) = self.expect_ident()?;
        self.expect(TokenKind::Period)?;
        let (event_out, ..) = self.expect_ident()?;
        let (to, to_line, to_col) = self.expect_ident()?;
        if to != "TO" {
            return Err(err_at(&self.uri, to_line, to_col, "expected TO"));
        }
        let (dst, ..) = self.expect_ident()?;
        self.expect(TokenKind::Period)?;
        let (event_in, ..) = self.expect_ident()?;
        self.frames
            .last_mut()
            .expect("frame stack never empty")
            .routes
            .push(PendingRoute {
                src,
                event_out,
                dst,
                event_in,
                line,
                col,
            });
        Ok(())
    }

    fn resolve_routes(&mut self, frame: &Frame) -> Result<(), SceneError> {
        for route in &frame.routes {
            let source = frame.scope.find_node(&route.src).ok_or_else(|| {
                err_at(
                    &self.uri,
                    route.line,
                    route.col,
                    format!("ROUTE references unknown node name {}", route.src),
                )
            })?;
            let target = frame.scope.find_node(&route.dst).ok_or_else(|| {
                err_at(
                    &self.uri,
                    route.line,
                    route.col,
                    format!("ROUTE references unknown node name {}", route.dst),
                )
            })?;
            crate::event::route::add_route(&source, &route.event_out, &target, &route.event_in)
                .map_err(|e| {
                    err_at(&self.uri, route.line, route.col, format!("bad ROUTE: {e}"))
                })?;
        }
        Ok(())
    }

    /// Best-effort cleanup after an aborted parse: rebalances the frame
    /// stack and reports what was completed before the failure. Nothing is
    /// guessed; the partial graph is dropped by the caller.
    fn salvage(&mut self, error: &SceneError) {
        let unfinished_nodes = self.open_nodes.len();
        let unfinished_frames = self.frames.len().saturating_sub(1);
        self.open_nodes.clear();
        while self.frames.len() > 1 {
            self.frames.pop();
        }
        self.frames.clear();
        Log::err(format!(
            "Parse of {} aborted: {error}. Salvaged {} complete root node(s); discarded {} unfinished node literal(s) and {} open scope frame(s).",
            self.uri,
            self.roots.len(),
            unfinished_nodes,
            unfinished_frames
        ));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::node::registry::MetatypeRegistry;

    /// Bundles the registries a parser test needs.
    pub struct TestWorld {
        pub metatypes: MetatypeRegistry,
        pub components: ComponentRegistry,
        pub profiles: ProfileRegistry,
    }

    impl TestWorld {
        pub fn new() -> Self {
            let metatypes = MetatypeRegistry::new();
            for metatype in crate::vrml97::standard_metatypes() {
                metatypes.register(metatype);
            }
            Self {
                metatypes,
                components: ComponentRegistry::new().unwrap(),
                profiles: ProfileRegistry::new(),
            }
        }

        pub fn ctx(&self) -> SceneContext<'_> {
            SceneContext {
                metatypes: &self.metatypes,
                components: &self.components,
                profiles: &self.profiles,
                world_url: String::new(),
                fetcher: None,
            }
        }

        pub fn parse(&self, source: &str) -> Result<ParseOutput, SceneError> {
            parse_scene(
                ResourceHandle::from_str(source),
                "file:///test.wrl",
                "model/vrml",
                &self.ctx(),
            )
        }

        pub fn parse_x3d(&self, source: &str) -> Result<ParseOutput, SceneError> {
            parse_scene(
                ResourceHandle::from_str(source),
                "file:///test.x3dv",
                "model/x3d-vrml",
                &self.ctx(),
            )
        }
    }
}

#[cfg(test)]
mod test {
    use super::test_support::TestWorld;
    use crate::{error::SceneError, field::FieldValue, node::NodeCategory};
    use nalgebra::Vector3;

    #[test]
    fn bad_media_type_is_rejected() {
        let world = TestWorld::new();
        let err = super::parse_scene(
            welt_core::io::ResourceHandle::from_str("#VRML V2.0 utf8\n"),
            "file:///x.wrl",
            "text/plain",
            &world.ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::BadMediaType { .. }));
    }

    #[test]
    fn missing_header_is_an_error() {
        let world = TestWorld::new();
        assert!(world.parse("Group { }").is_err());
    }

    #[test]
    fn parses_nested_shape() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 Group { children [ Shape { geometry Box { size 2 2 2 } } ] }",
            )
            .unwrap();
        assert_eq!(output.roots.len(), 1);
        let group = &output.roots[0];
        assert_eq!(group.node_type().local_id(), "Group");
        let children = group.get_field("children").unwrap();
        let FieldValue::MfNode(children) = children else {
            panic!("children is not MFNode");
        };
        assert_eq!(children.len(), 1);
        let shape = &children[0];
        assert_eq!(shape.node_type().local_id(), "Shape");
        let geometry = shape.get_field("geometry").unwrap();
        let box_node = geometry.as_node().unwrap().clone();
        assert_eq!(
            box_node.get_field("size").unwrap(),
            FieldValue::SfVec3f(Vector3::new(2.0, 2.0, 2.0))
        );
    }

    #[test]
    fn def_use_shares_one_node() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 DEF B Box { size 1 1 1 }\n\
                 Group { children [ USE B, USE B ] }",
            )
            .unwrap();
        let group = &output.roots[1];
        let FieldValue::MfNode(children) = group.get_field("children").unwrap() else {
            panic!("children is not MFNode");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], children[1]);
        assert_eq!(children[0], output.roots[0]);
    }

    #[test]
    fn routes_resolve_at_frame_end_with_forward_references() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 ROUTE TS.fraction_changed TO PI.set_fraction\n\
                 DEF TS TimeSensor { }\n\
                 DEF PI PositionInterpolator { }",
            )
            .unwrap();
        let ts = &output.roots[0];
        assert_eq!(ts.outgoing_routes().len(), 1);
    }

    #[test]
    fn unresolved_route_name_has_position() {
        let world = TestWorld::new();
        let err = world
            .parse(
                "#VRML V2.0 utf8\n\
                 Viewpoint { position 0 0 10 }\n\
                 ROUTE vp.bindTime TO vp.set_bind",
            )
            .unwrap_err();
        match err {
            SceneError::InvalidScene { line, col, message, .. } => {
                assert_eq!(line, 3);
                assert!(col >= 7);
                assert!(message.contains("vp"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_field_is_an_error() {
        let world = TestWorld::new();
        let err = world
            .parse("#VRML V2.0 utf8\nBox { radius 1 }")
            .unwrap_err();
        assert!(matches!(err, SceneError::InvalidScene { .. }));
    }

    #[test]
    fn proto_builds_a_usable_type() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 PROTO Widget [ field SFVec3f position 0 0 0 ] {\n\
                   Transform { translation IS position }\n\
                 }\n\
                 Widget { position 1 2 3 }",
            )
            .unwrap();
        assert_eq!(output.roots.len(), 1);
        let widget = &output.roots[0];
        assert_eq!(widget.category(), NodeCategory::ProtoInstance);
        let body = widget.all_children();
        let transform = body
            .iter()
            .find(|n| n.node_type().local_id() == "Transform")
            .expect("proto body transform");
        assert_eq!(
            transform.get_field("translation").unwrap(),
            FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn proto_instances_do_not_share_bodies() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 PROTO W [ field SFVec3f p 0 0 0 ] { Transform { translation IS p } }\n\
                 W { p 1 0 0 }\n\
                 W { p 2 0 0 }",
            )
            .unwrap();
        let first = output.roots[0].all_children();
        let second = output.roots[1].all_children();
        assert_ne!(first[0], second[0]);
        assert_eq!(
            first[0].get_field("translation").unwrap(),
            FieldValue::SfVec3f(Vector3::new(1.0, 0.0, 0.0))
        );
        assert_eq!(
            second[0].get_field("translation").unwrap(),
            FieldValue::SfVec3f(Vector3::new(2.0, 0.0, 0.0))
        );
    }

    #[test]
    fn externproto_without_resolution_installs_a_stub() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 EXTERNPROTO Widget [ field SFVec3f position ] \"widgets.wrl#Widget\"\n\
                 Widget { position 1 2 3 }",
            )
            .unwrap();
        assert_eq!(
            output.roots[0].category(),
            NodeCategory::ExternProtoStub
        );
        assert!(world
            .metatypes
            .contains("file:///widgets.wrl#Widget"));
    }

    #[test]
    fn x3d_profile_statement_selects_the_scope() {
        let world = TestWorld::new();
        let output = world
            .parse_x3d(
                "#X3D V3.0 utf8\n\
                 PROFILE Interchange\n\
                 META \"title\" \"test\"\n\
                 Shape { geometry Box { } }",
            )
            .unwrap();
        assert_eq!(output.metadata.get("title").map(String::as_str), Some("test"));
        assert_eq!(output.roots.len(), 1);
    }

    #[test]
    fn profile_gated_type_reports_unsupported_interface() {
        let world = TestWorld::new();
        let err = world
            .parse_x3d(
                "#X3D V3.0 utf8\n\
                 PROFILE Interchange\n\
                 KeySensor { }",
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnsupportedInterface { node_type, .. } if node_type == "KeySensor"
        ));
    }

    #[test]
    fn script_declares_its_own_interfaces() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 DEF S Script {\n\
                   eventIn SFBool activate\n\
                   field SFInt32 count 3\n\
                   field SFNode me USE S\n\
                 }",
            )
            .unwrap();
        let script = &output.roots[0];
        assert_eq!(script.get_field("count").unwrap(), FieldValue::SfInt32(3));
        assert!(script
            .node_type()
            .interfaces()
            .find_event_in("activate")
            .is_some());
    }
}
