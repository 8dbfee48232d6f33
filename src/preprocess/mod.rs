//! Notebook source rewriting
//!
//! Every stage here works on opaque cell text with regular expressions.
//! None of them parse Python; a directive written inside a string literal
//! or comment is rewritten like any other.

pub mod clear;
pub mod inline;
pub mod params;
pub mod replace;
pub mod sanitize;
pub mod shell_guard;

pub use inline::ReferenceInliner;
pub use params::{inject_parameters, merge_layers, ParamType, Parameter, ParameterSet};
pub use replace::{ReplacementRule, RuleSet};
pub use sanitize::{escape_markup, sanitize_outputs};
pub use shell_guard::ShellGuard;
