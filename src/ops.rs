//! Ops backing the realm script.
//!
//! The DOM lives in the `OpState` as a [`Document`]; every DOM op addresses
//! nodes by their raw [`NodeId`]. The extension at the bottom bundles these
//! ops with `bootstrap.js`.

use crate::dom::{select, Attribute, Document, NodeId};
use crate::error::display_path;
use crate::realm::ExecutingModule;
use crate::registry::{Capabilities, RegistryGuard};
use anyhow::{anyhow, Error};
use deno_core::{op2, OpState};

fn doc(state: &OpState) -> &Document {
    state.borrow::<Document>()
}

fn doc_mut(state: &mut OpState) -> &mut Document {
    state.borrow_mut::<Document>()
}

fn id(raw: u32) -> NodeId {
    NodeId::from_raw(raw)
}

fn executing_file(state: &OpState) -> String {
    let module = state.try_borrow::<ExecutingModule>().and_then(|m| m.0.as_deref());
    display_path(module)
}

// ============================================================================
// Console Ops
// ============================================================================

#[op2(fast)]
pub fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    tracing::info!(target: "ssr::console", file = %executing_file(state), "{msg}");
}

#[op2(fast)]
pub fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    tracing::warn!(target: "ssr::console", file = %executing_file(state), "{msg}");
}

#[op2(fast)]
pub fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    tracing::error!(target: "ssr::console", file = %executing_file(state), "{msg}");
}

// ============================================================================
// Crypto / Encoding Ops
// ============================================================================

#[op2]
#[string]
pub fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
pub fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

#[op2]
#[string]
pub fn op_btoa(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    // btoa only takes Latin-1; each char is one byte
    let bytes = data
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| anyhow!("btoa: character out of Latin-1 range")))
        .collect::<Result<Vec<u8>, Error>>()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[op2]
#[string]
pub fn op_atob(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| anyhow!("atob: invalid base64: {}", e))?;
    Ok(bytes.into_iter().map(char::from).collect())
}

// ============================================================================
// Registry Ops
// ============================================================================

/// Returns `"accepted"`, `"duplicate"` or `"invalid"`.
#[op2]
#[string]
pub fn op_registry_define(state: &mut OpState, #[string] tag: &str, render: bool, connect: bool) -> String {
    let file = state.try_borrow::<ExecutingModule>().and_then(|m| m.0.clone());
    state
        .borrow_mut::<RegistryGuard>()
        .define(tag, file.as_deref(), Capabilities { render, connect })
        .as_str()
        .to_string()
}

// ============================================================================
// DOM Ops - structure
// ============================================================================

#[op2(fast)]
pub fn op_dom_node_kind(state: &mut OpState, node: u32) -> u32 {
    doc(state).node_type(id(node))
}

#[op2]
#[string]
pub fn op_dom_tag_name(state: &mut OpState, node: u32) -> Option<String> {
    doc(state).tag_name(id(node)).map(str::to_string)
}

#[op2(fast)]
pub fn op_dom_create_element(state: &mut OpState, #[string] name: &str) -> u32 {
    doc_mut(state).create_element(name).raw()
}

#[op2(fast)]
pub fn op_dom_create_text(state: &mut OpState, #[string] text: &str) -> u32 {
    doc_mut(state).create_text(text).raw()
}

#[op2(fast)]
pub fn op_dom_create_comment(state: &mut OpState, #[string] text: &str) -> u32 {
    doc_mut(state).create_comment(text).raw()
}

#[op2(fast)]
pub fn op_dom_create_fragment(state: &mut OpState) -> u32 {
    doc_mut(state).create_fragment().raw()
}

#[op2]
pub fn op_dom_parent(state: &mut OpState, node: u32) -> Option<u32> {
    doc(state).parent(id(node)).map(NodeId::raw)
}

#[op2]
#[serde]
pub fn op_dom_children(state: &mut OpState, node: u32) -> Vec<u32> {
    doc(state).children(id(node)).iter().map(|c| c.raw()).collect()
}

#[op2]
pub fn op_dom_sibling(state: &mut OpState, node: u32, offset: i32) -> Option<u32> {
    doc(state).sibling(id(node), offset).map(NodeId::raw)
}

#[op2(fast)]
pub fn op_dom_append_child(state: &mut OpState, parent: u32, child: u32) -> Result<(), Error> {
    doc_mut(state).append_child(id(parent), id(child))?;
    Ok(())
}

#[op2]
pub fn op_dom_insert_before(
    state: &mut OpState,
    parent: u32,
    child: u32,
    reference: Option<u32>,
) -> Result<(), Error> {
    doc_mut(state).insert_before(id(parent), id(child), reference.map(id))?;
    Ok(())
}

#[op2(fast)]
pub fn op_dom_remove_child(state: &mut OpState, parent: u32, child: u32) -> Result<(), Error> {
    doc_mut(state).remove_child(id(parent), id(child))?;
    Ok(())
}

#[op2(fast)]
pub fn op_dom_clone(state: &mut OpState, node: u32, deep: bool) -> Result<u32, Error> {
    Ok(doc_mut(state).clone_node(id(node), deep)?.raw())
}

#[op2(fast)]
pub fn op_dom_contains(state: &mut OpState, ancestor: u32, node: u32) -> bool {
    doc(state).is_inclusive_ancestor(id(ancestor), id(node))
}

#[op2(fast)]
pub fn op_dom_is_connected(state: &mut OpState, node: u32) -> bool {
    doc(state).is_connected(id(node))
}

// ============================================================================
// DOM Ops - attributes and text
// ============================================================================

#[op2]
#[string]
pub fn op_dom_get_attribute(state: &mut OpState, node: u32, #[string] name: &str) -> Option<String> {
    doc(state).get_attribute(id(node), name).map(str::to_string)
}

#[op2(fast)]
pub fn op_dom_set_attribute(
    state: &mut OpState,
    node: u32,
    #[string] name: &str,
    #[string] value: &str,
) -> Result<(), Error> {
    doc_mut(state).set_attribute(id(node), name, value)?;
    Ok(())
}

#[op2(fast)]
pub fn op_dom_remove_attribute(state: &mut OpState, node: u32, #[string] name: &str) -> Result<bool, Error> {
    Ok(doc_mut(state).remove_attribute(id(node), name)?)
}

#[op2]
#[serde]
pub fn op_dom_attributes(state: &mut OpState, node: u32) -> Vec<Attribute> {
    doc(state).attributes(id(node)).to_vec()
}

#[op2]
#[string]
pub fn op_dom_text_content(state: &mut OpState, node: u32) -> String {
    doc(state).text_content(id(node))
}

#[op2(fast)]
pub fn op_dom_set_text_content(state: &mut OpState, node: u32, #[string] text: &str) -> Result<(), Error> {
    doc_mut(state).set_text_content(id(node), text)?;
    Ok(())
}

// ============================================================================
// DOM Ops - markup and queries
// ============================================================================

#[op2]
#[string]
pub fn op_dom_inner_html(state: &mut OpState, node: u32) -> String {
    doc(state).inner_html(id(node))
}

#[op2(fast)]
pub fn op_dom_set_inner_html(state: &mut OpState, node: u32, #[string] html: &str) -> Result<(), Error> {
    doc_mut(state).set_inner_html(id(node), html)?;
    Ok(())
}

#[op2]
#[string]
pub fn op_dom_outer_html(state: &mut OpState, node: u32) -> String {
    doc(state).outer_html(id(node))
}

#[op2]
#[serde]
pub fn op_dom_query(state: &mut OpState, scope: u32, #[string] selector: &str, first: bool) -> Result<Vec<u32>, Error> {
    let found = select::query(doc(state), id(scope), selector, first)?;
    Ok(found.into_iter().map(NodeId::raw).collect())
}

#[op2(fast)]
pub fn op_dom_matches(state: &mut OpState, node: u32, #[string] selector: &str) -> Result<bool, Error> {
    Ok(select::matches(doc(state), id(node), selector)?)
}

#[op2]
pub fn op_dom_element_by_id(state: &mut OpState, scope: u32, #[string] value: &str) -> Option<u32> {
    doc(state).element_by_id(id(scope), value).map(NodeId::raw)
}

// ============================================================================
// Extension Definition
// ============================================================================

deno_core::extension!(
    ssr_realm,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_btoa,
        op_atob,
        op_registry_define,
        op_dom_node_kind,
        op_dom_tag_name,
        op_dom_create_element,
        op_dom_create_text,
        op_dom_create_comment,
        op_dom_create_fragment,
        op_dom_parent,
        op_dom_children,
        op_dom_sibling,
        op_dom_append_child,
        op_dom_insert_before,
        op_dom_remove_child,
        op_dom_clone,
        op_dom_contains,
        op_dom_is_connected,
        op_dom_get_attribute,
        op_dom_set_attribute,
        op_dom_remove_attribute,
        op_dom_attributes,
        op_dom_text_content,
        op_dom_set_text_content,
        op_dom_inner_html,
        op_dom_set_inner_html,
        op_dom_outer_html,
        op_dom_query,
        op_dom_matches,
        op_dom_element_by_id,
    ],
    esm_entry_point = "ext:ssr_realm/bootstrap.js",
    esm = ["ext:ssr_realm/bootstrap.js" = "src/bootstrap.js"],
);

