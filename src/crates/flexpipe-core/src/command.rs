//! Reconfiguration primitives and their textual grammar
//!
//! A primitive command line is `ACTION TARGET? ARG*` with whitespace-separated
//! tokens. `trigger` and `init_p4objects_new` take no target; every other
//! action requires one, and each `(action, target)` pair has a fixed arity.
//! Parsing validates all three and produces a structured [`ReconfigRequest`];
//! any mismatch is an [`ReconfigError::InvalidCommand`].

use crate::error::{ReconfigError, Result};
use crate::name::MountSlot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primitive action understood by the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Insert,
    Change,
    Delete,
    Trigger,
    InitP4ObjectsNew,
}

impl Action {
    pub fn keyword(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Change => "change",
            Action::Delete => "delete",
            Action::Trigger => "trigger",
            Action::InitP4ObjectsNew => "init_p4objects_new",
        }
    }

    fn parse(token: &str) -> Result<Self> {
        match token {
            "insert" => Ok(Action::Insert),
            "change" => Ok(Action::Change),
            "delete" => Ok(Action::Delete),
            "trigger" => Ok(Action::Trigger),
            "init_p4objects_new" => Ok(Action::InitP4ObjectsNew),
            other => Err(ReconfigError::InvalidCommand(format!(
                "can't recognize action {other}; it should be one of \
                 insert, change, delete, trigger, init_p4objects_new"
            ))),
        }
    }
}

/// Target of an `insert`/`change`/`delete` action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Tabl,
    Cond,
    Flex,
    RegisterArray,
    RegisterArraySize,
    RegisterArrayBitwidth,
    Init,
}

impl Target {
    pub fn keyword(&self) -> &'static str {
        match self {
            Target::Tabl => "tabl",
            Target::Cond => "cond",
            Target::Flex => "flex",
            Target::RegisterArray => "register_array",
            Target::RegisterArraySize => "register_array_size",
            Target::RegisterArrayBitwidth => "register_array_bitwidth",
            Target::Init => "init",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "tabl" => Some(Target::Tabl),
            "cond" => Some(Target::Cond),
            "flex" => Some(Target::Flex),
            "register_array" => Some(Target::RegisterArray),
            "register_array_size" => Some(Target::RegisterArraySize),
            "register_array_bitwidth" => Some(Target::RegisterArrayBitwidth),
            "init" => Some(Target::Init),
            _ => None,
        }
    }
}

/// A validated reconfiguration primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigRequest {
    pub action: Action,
    pub target: Option<Target>,
    pub args: Vec<String>,
}

impl ReconfigRequest {
    /// Whether this primitive is a `trigger` — the only action whose switch
    /// response carries no updated pipeline JSON
    pub fn is_trigger(&self) -> bool {
        self.action == Action::Trigger
    }

    fn validate_target(action: Action, token: &str) -> Result<Target> {
        let target = Target::parse(token);
        let valid: &[Target] = match action {
            Action::Insert | Action::Delete => {
                &[Target::Tabl, Target::Cond, Target::Flex, Target::RegisterArray]
            }
            Action::Change => &[
                Target::Tabl,
                Target::Cond,
                Target::Flex,
                Target::RegisterArraySize,
                Target::RegisterArrayBitwidth,
                Target::Init,
            ],
            Action::Trigger | Action::InitP4ObjectsNew => &[],
        };
        match target {
            Some(t) if valid.contains(&t) => Ok(t),
            _ => Err(ReconfigError::InvalidCommand(format!(
                "can't recognize action target for {}: {token}",
                action.keyword()
            ))),
        }
    }

    fn expected_arity(action: Action, target: Target) -> usize {
        match (action, target) {
            (Action::Insert, Target::Tabl | Target::Cond) => 2,
            (Action::Insert, Target::Flex) => 4,
            (Action::Insert, Target::RegisterArray) => 3,
            (Action::Change, Target::Tabl | Target::Cond | Target::Flex) => 4,
            (Action::Change, Target::RegisterArraySize | Target::RegisterArrayBitwidth) => 2,
            (Action::Change, Target::Init) => 2,
            (Action::Delete, Target::Tabl | Target::Cond | Target::Flex) => 2,
            (Action::Delete, Target::RegisterArray) => 1,
            _ => unreachable!("target already validated against action"),
        }
    }
}

impl FromStr for ReconfigRequest {
    type Err = ReconfigError;

    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            return Err(ReconfigError::InvalidCommand("empty command".into()));
        };
        let action = Action::parse(first)?;

        // trigger and init_p4objects_new are targetless
        match action {
            Action::Trigger => {
                if tokens.len() != 3 {
                    return Err(ReconfigError::InvalidCommand(
                        "`trigger` requires on/off and a mount point number".into(),
                    ));
                }
                if tokens[1] != "on" && tokens[1] != "off" {
                    return Err(ReconfigError::InvalidCommand(format!(
                        "`trigger` expects on or off, got {}",
                        tokens[1]
                    )));
                }
                MountSlot::parse(tokens[2])?;
                return Ok(ReconfigRequest {
                    action,
                    target: None,
                    args: tokens[1..].iter().map(|s| s.to_string()).collect(),
                });
            }
            Action::InitP4ObjectsNew => {
                if tokens.len() != 2 {
                    return Err(ReconfigError::InvalidCommand(
                        "`init_p4objects_new` requires 1 argument".into(),
                    ));
                }
                return Ok(ReconfigRequest {
                    action,
                    target: None,
                    args: vec![tokens[1].to_string()],
                });
            }
            _ => {}
        }

        let Some(&target_token) = tokens.get(1) else {
            return Err(ReconfigError::InvalidCommand(format!(
                "`{}` requires an action target",
                action.keyword()
            )));
        };
        let target = Self::validate_target(action, target_token)?;
        let args: Vec<String> = tokens[2..].iter().map(|s| s.to_string()).collect();
        let expected = Self::expected_arity(action, target);
        if args.len() != expected {
            return Err(ReconfigError::InvalidCommand(format!(
                "`{} {}` should have {expected} arguments, got {}",
                action.keyword(),
                target.keyword(),
                args.len()
            )));
        }

        // per-target argument shape
        match (action, target) {
            (Action::Change, Target::Cond | Target::Flex) => {
                if args[2] != "true_next" && args[2] != "false_next" {
                    return Err(ReconfigError::InvalidCommand(format!(
                        "`change {}` expects true_next or false_next, got {}",
                        target.keyword(),
                        args[2]
                    )));
                }
            }
            (Action::Change, Target::RegisterArraySize | Target::RegisterArrayBitwidth) => {
                args[1].parse::<u64>().map_err(|_| {
                    ReconfigError::InvalidCommand(format!(
                        "`change {}` expects an integer value, got {}",
                        target.keyword(),
                        args[1]
                    ))
                })?;
            }
            (Action::Insert, Target::RegisterArray) => {
                for arg in &args[1..] {
                    arg.parse::<u64>().map_err(|_| {
                        ReconfigError::InvalidCommand(format!(
                            "`insert register_array` expects integer size and bitwidth, got {arg}"
                        ))
                    })?;
                }
            }
            _ => {}
        }

        Ok(ReconfigRequest {
            action,
            target: Some(target),
            args,
        })
    }
}

impl fmt::Display for ReconfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action.keyword())?;
        if let Some(target) = self.target {
            write!(f, " {}", target.keyword())?;
        }
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
