// ldapper: Active Directory LDAP reconnaissance client
// Exposes the catalog, base DN derivation and paged search driver as a library

pub mod catalog;
pub mod cli;
pub mod directory;
pub mod dns;
pub mod error;
pub mod output;
pub mod rate_limit;
pub mod sanitize;
pub mod search;
pub mod validation;
