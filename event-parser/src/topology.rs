//! Parser for Sonos `ZoneGroupState` topology documents.
//!
//! A topology document describes which devices are grouped together for
//! coordinated playback. Each `ZoneGroup` has exactly one coordinator, which
//! is always one of its members. Members are resolved through an injected
//! [`DeviceRegistry`] keyed by the device's network address, so repeated
//! parses that mention the same physical device converge on the same handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use url::Url;
use xmltree::{Element, XMLNode};

use crate::error::{ParseError, ParseResult};

/// A device that participates in zone groups.
#[derive(Debug, Clone, Default)]
pub struct ZoneMember {
    /// Stable unique id (the `UUID` attribute, e.g. `RINCON_...`)
    pub uid: String,
    /// Display name of the room/zone, updated on every parse
    pub name: String,
    /// Whether this member coordinates its current group
    pub is_coordinator: bool,
    /// Whether this device is a zone bridge. Bridges are never satellites
    /// or coordinators.
    pub is_bridge: bool,
}

/// Shared handle to a [`ZoneMember`].
///
/// Handles are owned by the [`DeviceRegistry`]; the topology parser only
/// borrows and updates them.
pub type MemberHandle = Arc<RwLock<ZoneMember>>;

/// Collaborator that resolves device handles by network address.
///
/// The registry is the single source of member identity: asking for the same
/// host twice must return the same handle. Injecting it keeps topology
/// parsing testable with a fake registry.
pub trait DeviceRegistry: Send + Sync {
    /// Look up or create the member handle for a device at `host`.
    fn member_at(&self, host: &str) -> MemberHandle;
}

/// Default in-memory [`DeviceRegistry`] backed by a host-keyed map.
#[derive(Default)]
pub struct InMemoryRegistry {
    members: Mutex<HashMap<String, MemberHandle>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for InMemoryRegistry {
    fn member_at(&self, host: &str) -> MemberHandle {
        let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        members
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(ZoneMember::default())))
            .clone()
    }
}

/// A group of devices playing in sync.
#[derive(Debug, Clone)]
pub struct ZoneGroup {
    /// Unique group identifier (the `ID` attribute)
    pub uid: String,
    /// The member coordinating this group
    pub coordinator: MemberHandle,
    /// All members of the group, coordinator included
    pub members: Vec<MemberHandle>,
    label: String,
    short_label: String,
}

impl ZoneGroup {
    /// Build a group, computing its display labels from the members' names.
    ///
    /// Labels are derived once here and not recomputed later, so they stay
    /// consistent even if member names change between parses.
    fn new(uid: String, coordinator: MemberHandle, members: Vec<MemberHandle>) -> Self {
        let mut names: Vec<String> = members
            .iter()
            .map(|m| read_member(m).name.clone())
            .collect();
        names.sort();

        let label = names.join(", ");
        let mut short_label = names.first().cloned().unwrap_or_default();
        if names.len() > 1 {
            short_label.push_str(&format!(" + {}", names.len() - 1));
        }

        Self {
            uid,
            coordinator,
            members,
            label,
            short_label,
        }
    }

    /// Comma-separated list of all member names, sorted.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// First member name plus a count of the others, e.g. `"Kitchen + 2"`.
    pub fn short_label(&self) -> &str {
        &self.short_label
    }

    /// Whether `member` belongs to this group.
    pub fn contains(&self, member: &MemberHandle) -> bool {
        self.members.iter().any(|m| Arc::ptr_eq(m, member))
    }

    /// Iterate over the group's members.
    pub fn iter(&self) -> impl Iterator<Item = &MemberHandle> {
        self.members.iter()
    }
}

/// Parse a `ZoneGroupState` document into its groups.
///
/// The root may be the `ZoneGroups` element itself or a wrapper containing
/// one. Topology is re-derived fresh on every call; only member identity is
/// carried over, through the registry.
///
/// # Errors
///
/// Fails on malformed XML, on members missing their `Location`, `UUID` or
/// `ZoneName` attributes, and on groups whose declared coordinator is not
/// among the parsed members.
pub fn parse_zone_group_state(
    xml: &str,
    registry: &dyn DeviceRegistry,
) -> ParseResult<Vec<ZoneGroup>> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ParseError::InvalidXml(e.to_string()))?;

    let container = if root.name == "ZoneGroups" {
        &root
    } else {
        root.get_child("ZoneGroups").unwrap_or(&root)
    };

    container
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(|e| e.name == "ZoneGroup")
        .map(|group| parse_zone_group(group, registry))
        .collect()
}

fn parse_zone_group(
    group: &Element,
    registry: &dyn DeviceRegistry,
) -> ParseResult<ZoneGroup> {
    let coordinator_uid = required_attribute(group, "Coordinator")?;
    let group_uid = required_attribute(group, "ID")?;

    let mut members: Vec<MemberHandle> = Vec::new();
    for element in group.children.iter().filter_map(XMLNode::as_element) {
        if element.name != "ZoneGroupMember" {
            continue;
        }
        members.push(parse_member(element, registry, &coordinator_uid, false)?);

        // Home-theater satellites hang off their primary member. They join
        // the group but are never coordinator or bridge candidates.
        for satellite in element
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .filter(|e| e.name == "Satellite")
        {
            members.push(parse_member(satellite, registry, &coordinator_uid, true)?);
        }
    }

    let coordinator = members
        .iter()
        .find(|m| read_member(m).uid == coordinator_uid)
        .cloned()
        .ok_or_else(|| ParseError::CoordinatorNotFound {
            coordinator: coordinator_uid,
            group: group_uid.clone(),
        })?;

    Ok(ZoneGroup::new(group_uid, coordinator, members))
}

/// Resolve one member (or satellite) element through the registry and bring
/// its mutable state up to date.
fn parse_member(
    element: &Element,
    registry: &dyn DeviceRegistry,
    coordinator_uid: &str,
    is_satellite: bool,
) -> ParseResult<MemberHandle> {
    let location = required_attribute(element, "Location")?;
    let host = Url::parse(&location)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| ParseError::InvalidLocation(location.clone()))?;

    let uid = required_attribute(element, "UUID")?;
    let name = required_attribute(element, "ZoneName")?;
    let is_bridge = element.attributes.get("IsZoneBridge").map(String::as_str) == Some("1");

    let handle = registry.member_at(&host);
    {
        let mut member = handle.write().unwrap_or_else(|e| e.into_inner());
        member.uid = uid.clone();
        member.name = name;
        if is_satellite {
            member.is_coordinator = false;
            member.is_bridge = false;
        } else {
            member.is_coordinator = uid == coordinator_uid;
            member.is_bridge = is_bridge;
        }
    }
    Ok(handle)
}

fn required_attribute(element: &Element, attribute: &str) -> ParseResult<String> {
    element
        .attributes
        .get(attribute)
        .cloned()
        .ok_or_else(|| ParseError::MissingAttribute {
            element: element.name.clone(),
            attribute: attribute.to_string(),
        })
}

fn read_member(handle: &MemberHandle) -> std::sync::RwLockReadGuard<'_, ZoneMember> {
    handle.read().unwrap_or_else(|e| e.into_inner())
}
