//! sitewall Network Layer
//!
//! Declarative blocking rules and the in-process rule set that applies them.
//!
//! Architecture:
//! 1. Rule store projects each block entry onto one dynamic rule
//! 2. Dynamic rule set validates and indexes the rules
//! 3. Navigation request → domain suffix lookup + substring automaton
//! 4. Winning rule redirects the page load to the extension's blocked page

mod filter;
mod rule;
mod rule_set;

pub use filter::{FilterKind, UrlFilter, domain_filter, domain_of, host_matches_domain};
pub use rule::{
    Redirect, ResourceType, Rule, RuleAction, RuleActionType, RuleCondition, RuleUpdate,
};
pub use rule_set::{
    DynamicRuleSet, MAX_DYNAMIC_RULES, RuleBackend, RuleSetConfig, RuleSetError, RuleSetStats,
};
