//! Flex-name discipline: stable node identities across reconfigurations
//!
//! Every table and conditional in a pipeline carries a *flex-name*, the
//! identity used by all reconfiguration primitives. A flex-name encodes a
//! lineage prefix (`old_` for nodes present in the initial pipeline, `new_`
//! for nodes introduced by reconfiguration, `flx_` for mount-point branches),
//! a one-character kind (`t` table, `c` conditional; `flx_` nodes carry
//! none), and the original object name. The synthetic graph root and sink
//! are `old_r` and `old_s`.
//!
//! Three encodings exist and round-trip losslessly:
//!
//! - the flex-name itself (`old_tMyIngress.acl`),
//! - the human-readable form shown to operators (`table[old_MyIngress.acl]`),
//! - the wire form sent to the switch, which strips the kind letter
//!   (`old_MyIngress.acl`) because the primitive keyword already carries it.

use crate::error::{ReconfigError, Result};
use std::fmt;

/// Flex-name of the synthetic graph root
pub const ROOT: &str = "old_r";

/// Flex-name of the synthetic graph sink
pub const SINK: &str = "old_s";

/// Wire token denoting the sink in any `<next-or-null>` slot
pub const NULL_TOKEN: &str = "null";

const LINEAGE_LEN: usize = 4;

/// Node lineage, encoded by the 4-character flex-name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    /// Present in the initial pipeline (`old_`)
    Old,
    /// Introduced by reconfiguration (`new_`)
    New,
    /// Mount-point branch (`flx_`)
    Flex,
}

impl Lineage {
    pub fn prefix(&self) -> &'static str {
        match self {
            Lineage::Old => "old_",
            Lineage::New => "new_",
            Lineage::Flex => "flx_",
        }
    }
}

/// Node kind, encoded by the character after the lineage prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Table,
    Conditional,
}

impl NodeKind {
    pub fn letter(&self) -> char {
        match self {
            NodeKind::Table => 't',
            NodeKind::Conditional => 'c',
        }
    }

    /// Primitive keyword for this kind (`tabl` / `cond`)
    pub fn keyword(&self) -> &'static str {
        match self {
            NodeKind::Table => "tabl",
            NodeKind::Conditional => "cond",
        }
    }
}

/// A validated flex-name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlexName(String);

impl FlexName {
    /// Parse and validate a flex-name.
    ///
    /// Accepts the synthetic `old_r`/`old_s`, any `flx_*` branch name, and
    /// `old_`/`new_` names carrying a kind letter and a non-empty suffix.
    pub fn parse(s: &str) -> Result<Self> {
        if s == ROOT || s == SINK {
            return Ok(FlexName(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix("flx_") {
            if rest.is_empty() {
                return Err(ReconfigError::InvalidName(format!(
                    "flex branch name has empty suffix: {s}"
                )));
            }
            return Ok(FlexName(s.to_string()));
        }
        if s.starts_with("old_") || s.starts_with("new_") {
            let mut rest = s[LINEAGE_LEN..].chars();
            match rest.next() {
                Some('t') | Some('c') => {}
                _ => {
                    return Err(ReconfigError::InvalidName(format!(
                        "flex-name lacks a kind letter (t/c): {s}"
                    )))
                }
            }
            if rest.next().is_none() {
                return Err(ReconfigError::InvalidName(format!(
                    "flex-name has empty suffix: {s}"
                )));
            }
            return Ok(FlexName(s.to_string()));
        }
        Err(ReconfigError::InvalidName(format!(
            "flex-name lacks a lineage prefix (old_/new_/flx_): {s}"
        )))
    }

    /// Build a flex-name from its parts
    pub fn tagged(lineage: Lineage, kind: NodeKind, name: &str) -> Result<Self> {
        if matches!(lineage, Lineage::Flex) {
            return Err(ReconfigError::InvalidName(
                "flx_ names carry no kind letter; use FlexName::parse".into(),
            ));
        }
        FlexName::parse(&format!("{}{}{}", lineage.prefix(), kind.letter(), name))
    }

    pub fn root() -> Self {
        FlexName(ROOT.to_string())
    }

    pub fn sink() -> Self {
        FlexName(SINK.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    pub fn is_sink(&self) -> bool {
        self.0 == SINK
    }

    /// True for mount-point branch names (`flx_*`)
    pub fn is_flex_branch(&self) -> bool {
        self.0.starts_with("flx_")
    }

    pub fn lineage(&self) -> Lineage {
        if self.0.starts_with("new_") {
            Lineage::New
        } else if self.0.starts_with("flx_") {
            Lineage::Flex
        } else {
            Lineage::Old
        }
    }

    /// Node kind; `None` for the synthetic root/sink and `flx_*` branches
    pub fn kind(&self) -> Option<NodeKind> {
        if self.is_root() || self.is_sink() || self.is_flex_branch() {
            return None;
        }
        match self.0.as_bytes()[LINEAGE_LEN] {
            b't' => Some(NodeKind::Table),
            b'c' => Some(NodeKind::Conditional),
            _ => None,
        }
    }

    /// Primitive keyword for this node (`tabl` / `cond` / `flex`)
    pub fn keyword(&self) -> &'static str {
        match self.kind() {
            Some(k) => k.keyword(),
            None => "flex",
        }
    }

    /// The name sent to the switch: the kind letter is stripped (the
    /// primitive keyword carries it), `flx_*` names pass through, and the
    /// sink is the literal `null` token.
    pub fn wire_name(&self) -> String {
        if self.is_sink() {
            return NULL_TOKEN.to_string();
        }
        match self.kind() {
            Some(_) => format!("{}{}", &self.0[..LINEAGE_LEN], &self.0[LINEAGE_LEN + 1..]),
            None => self.0.clone(),
        }
    }

    /// Human-readable form: `[root]`, `[sink]`, `flx_*` passthrough, or
    /// `table[<prefix><name>]` / `conditional[<prefix><name>]`
    pub fn to_human_readable(&self) -> String {
        if self.is_root() {
            return "[root]".to_string();
        }
        if self.is_sink() {
            return "[sink]".to_string();
        }
        match self.kind() {
            Some(NodeKind::Table) => format!("table[{}]", self.wire_name()),
            Some(NodeKind::Conditional) => format!("conditional[{}]", self.wire_name()),
            None => self.0.clone(),
        }
    }

    /// Parse the human-readable form back into a flex-name
    pub fn from_human_readable(s: &str) -> Result<Self> {
        if s == "[root]" {
            return Ok(FlexName::root());
        }
        if s == "[sink]" {
            return Ok(FlexName::sink());
        }
        if s.starts_with("flx_") {
            return FlexName::parse(s);
        }
        let (type_name, rest) = s.split_once('[').ok_or_else(|| {
            ReconfigError::InvalidName(format!("human-readable name lacks '[': {s}"))
        })?;
        let inner = rest.strip_suffix(']').ok_or_else(|| {
            ReconfigError::InvalidName(format!("human-readable name lacks closing ']': {s}"))
        })?;
        if inner.len() <= LINEAGE_LEN {
            return Err(ReconfigError::InvalidName(format!(
                "human-readable name has no node name: {s}"
            )));
        }
        let kind = match type_name {
            "table" => NodeKind::Table,
            "conditional" => NodeKind::Conditional,
            _ => {
                return Err(ReconfigError::InvalidName(format!(
                    "unknown node type [{type_name}] in human-readable name: {s}"
                )))
            }
        };
        let (prefix, name) = inner.split_at(LINEAGE_LEN);
        if prefix != "old_" && prefix != "new_" {
            return Err(ReconfigError::InvalidName(format!(
                "human-readable name has no lineage prefix: {s}"
            )));
        }
        FlexName::parse(&format!("{prefix}{}{name}", kind.letter()))
    }
}

impl fmt::Display for FlexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the 128 mount-point slots a function may be spliced into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountSlot(u8);

impl MountSlot {
    /// Exclusive upper bound on slot numbers
    pub const LIMIT: i64 = 128;

    pub fn new(n: i64) -> Result<Self> {
        if !(0..Self::LIMIT).contains(&n) {
            return Err(ReconfigError::InvalidCommand(format!(
                "mount point number should be in range [0, {}): {n}",
                Self::LIMIT
            )));
        }
        Ok(MountSlot(n as u8))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let n: i64 = s.parse().map_err(|_| {
            ReconfigError::InvalidCommand(format!("mount point number is not an integer: {s}"))
        })?;
        Self::new(n)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Flex-name of this slot's mount-point branch
    pub fn branch_name(&self) -> FlexName {
        FlexName(format!("flx_flex_func_mount_point_number_${}$", self.0))
    }
}

impl fmt::Display for MountSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_names() {
        let f = FlexName::parse("old_tMyIngress.acl").unwrap();
        assert_eq!(f.lineage(), Lineage::Old);
        assert_eq!(f.kind(), Some(NodeKind::Table));
        assert_eq!(f.wire_name(), "old_MyIngress.acl");

        let c = FlexName::parse("new_cnode_4").unwrap();
        assert_eq!(c.lineage(), Lineage::New);
        assert_eq!(c.kind(), Some(NodeKind::Conditional));
    }

    #[test]
    fn rejects_untagged_names() {
        assert!(FlexName::parse("MyIngress.acl").is_err());
        assert!(FlexName::parse("old_xfoo").is_err());
        assert!(FlexName::parse("old_t").is_err());
        assert!(FlexName::parse("flx_").is_err());
    }

    #[test]
    fn synthetic_names() {
        assert!(FlexName::parse(ROOT).unwrap().is_root());
        assert!(FlexName::parse(SINK).unwrap().is_sink());
        assert_eq!(FlexName::sink().wire_name(), NULL_TOKEN);
    }

    #[test]
    fn human_readable_round_trip() {
        assert_eq!(
            FlexName::parse("old_tMyIngress.acl")
                .unwrap()
                .to_human_readable(),
            "table[old_MyIngress.acl]"
        );
        assert_eq!(
            FlexName::from_human_readable("conditional[new_node_4]")
                .unwrap()
                .as_str(),
            "new_cnode_4"
        );
        for raw in [
            "old_tMyIngress.acl",
            "new_cnode_4",
            "flx_flex_func_mount_point_number_$7$",
            ROOT,
            SINK,
        ] {
            let f = FlexName::parse(raw).unwrap();
            let back = FlexName::from_human_readable(&f.to_human_readable()).unwrap();
            assert_eq!(back, f);
        }
    }

    #[test]
    fn rejects_bad_human_readable() {
        assert!(FlexName::from_human_readable("table[MyIngress.acl]").is_err());
        assert!(FlexName::from_human_readable("register[old_x]").is_err());
        assert!(FlexName::from_human_readable("table[old_x").is_err());
    }

    #[test]
    fn mount_slots() {
        let slot = MountSlot::new(3).unwrap();
        assert_eq!(
            slot.branch_name().as_str(),
            "flx_flex_func_mount_point_number_$3$"
        );
        assert!(slot.branch_name().is_flex_branch());
        assert!(MountSlot::new(128).is_err());
        assert!(MountSlot::new(-1).is_err());
        assert!(MountSlot::parse("127").is_ok());
        assert!(MountSlot::parse("abc").is_err());
    }
}
