use std::fs::File;
use std::path::Path;

use xmltree::{Element, XMLNode};

use crate::error::{LaunchError, Result};

/// Points `backclient.config.xml` at the target server.
///
/// BackOffice writes the file on first run with placeholder connection
/// values. `ServersList` must exist; its `ServerAddr`, `Protocol` and `Port`
/// children and the root-level `Login` are overwritten when present and
/// logged and skipped when absent.
pub fn rewrite_client_config(
    path: &Path,
    host: &str,
    port: u16,
    protocol: &str,
    login: &str,
) -> Result<()> {
    log::info!("rewriting client config '{}'", path.display());

    let file = File::open(path).map_err(|err| LaunchError::ClientConfig {
        path: path.to_path_buf(),
        message: format!("could not open: {err}"),
    })?;
    let mut root = Element::parse(file).map_err(|err| LaunchError::ClientConfig {
        path: path.to_path_buf(),
        message: format!("could not parse: {err}"),
    })?;

    let Some(servers_list) = find_descendant_mut(&mut root, "ServersList") else {
        return Err(LaunchError::ClientConfig {
            path: path.to_path_buf(),
            message: "no <ServersList> element".to_string(),
        });
    };

    if !set_child_text(servers_list, "ServerAddr", host) {
        log::warn!("client config has no <ServerAddr>, leaving the address unset");
    }
    if !set_child_text(servers_list, "Protocol", protocol) {
        log::warn!("client config has no <Protocol>, leaving the protocol unset");
    }
    if !set_child_text(servers_list, "Port", &port.to_string()) {
        log::warn!("client config has no <Port>, leaving the port unset");
    }

    match find_descendant_mut(&mut root, "Login") {
        Some(login_node) => set_text(login_node, login),
        None => log::info!("client config has no <Login>, skipping the default login"),
    }

    let out = File::create(path).map_err(|err| LaunchError::ClientConfig {
        path: path.to_path_buf(),
        message: format!("could not write: {err}"),
    })?;
    root.write(out).map_err(|err| LaunchError::ClientConfig {
        path: path.to_path_buf(),
        message: format!("could not serialize: {err}"),
    })?;

    log::info!("client config now points at {protocol}://{host}:{port}");
    Ok(())
}

/// Depth-first search for the first descendant (or the element itself) with
/// the given name.
fn find_descendant_mut<'a>(element: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    if element.name == name {
        return Some(element);
    }
    element
        .children
        .iter_mut()
        .filter_map(|node| match node {
            XMLNode::Element(child) => find_descendant_mut(child, name),
            _ => None,
        })
        .next()
}

/// The connection values usually sit inside a nested `<Server>` entry, so
/// this searches the whole subtree rather than direct children only.
fn set_child_text(parent: &mut Element, name: &str, value: &str) -> bool {
    match find_descendant_mut(parent, name) {
        Some(child) => {
            set_text(child, value);
            true
        }
        None => false,
    }
}

fn set_text(element: &mut Element, value: &str) {
    element.children = vec![XMLNode::Text(value.to_string())];
}
