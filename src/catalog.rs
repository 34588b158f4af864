//! Catalog of canned reconnaissance searches
//!
//! The catalog is a tree of search definitions addressed by dotted, 1-based
//! indices (`"3"`, `"9.2"`). An entry may ask the operator for input; each
//! answer is validated, escaped and substituted into the entry's filter
//! template in declaration order.
//!
//! The tree is immutable once built. Templates and validation patterns are
//! checked when the tree is constructed, so resolving an address can only
//! fail because the address does not exist (or input runs dry mid-prompt).

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::CatalogError;
use crate::sanitize::escape_filter_value;
use crate::validation::{parse_address, AnswerPattern, HOSTNAME_PATTERN, NON_EMPTY_PATTERN};

/// Seconds between 1601-01-01 (FILETIME epoch) and the Unix epoch, in 100ns ticks
const FILETIME_UNIX_OFFSET: i64 = 116_444_736_000_000_000;

/// Attribute always kept in projected records
pub const IDENTIFYING_ATTRIBUTE: &str = "cn";

/// One piece of a parsed filter template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(usize),
}

/// A filter string split into literal text and positional placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FilterTemplate {
    /// Splits a template on `{N}` placeholders
    ///
    /// Braces that do not enclose a decimal index are kept as literal text.
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let index = after.find('}').and_then(|close| {
                let digits = &after[..close];
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                digits.parse::<usize>().ok().map(|n| (n, close))
            });

            match index {
                Some((n, close)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(n));
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: template.to_string(),
            segments,
        }
    }

    /// The template as authored
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Distinct placeholder indices, ascending
    pub fn placeholders(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(n) => Some(*n),
                Segment::Literal(_) => None,
            })
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Substitutes already-escaped answers into the template
    pub fn render(&self, answers: &[String]) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Placeholder(n) => answers.get(*n).map(String::as_str).unwrap_or_default(),
            })
            .collect()
    }
}

/// A question put to the operator before an entry can run
#[derive(Debug, Clone)]
pub struct Prompt {
    pub question: String,
    pub pattern: AnswerPattern,
}

impl Prompt {
    pub fn new(question: &str, pattern: &str) -> Result<Self, CatalogError> {
        let pattern = AnswerPattern::new(pattern).map_err(|source| CatalogError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            question: question.to_string(),
            pattern,
        })
    }
}

/// A node of the catalog tree
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub help: String,
    pub template: FilterTemplate,
    pub projection: Vec<String>,
    pub prompts: Vec<Prompt>,
    pub children: Vec<CatalogEntry>,
    /// `false` for searches nobody has confirmed against a live directory
    pub verified: bool,
}

impl CatalogEntry {
    pub fn new(help: &str, template: &str) -> Self {
        Self {
            help: help.to_string(),
            template: FilterTemplate::parse(template),
            projection: Vec::new(),
            prompts: Vec::new(),
            children: Vec::new(),
            verified: true,
        }
    }

    pub fn project(mut self, attributes: &[&str]) -> Self {
        self.projection = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn child(mut self, child: CatalogEntry) -> Self {
        self.children.push(child);
        self
    }

    pub fn unverified(mut self) -> Self {
        self.verified = false;
        self
    }

    fn check(&self) -> Result<(), CatalogError> {
        let placeholders = self.template.placeholders();
        let expected: Vec<usize> = (0..self.prompts.len()).collect();

        if placeholders != expected {
            return Err(CatalogError::PlaceholderMismatch {
                template: self.template.as_str().to_string(),
                placeholders,
                prompts: self.prompts.len(),
            });
        }

        self.children.iter().try_for_each(CatalogEntry::check)
    }
}

/// A concrete filter ready to be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub filter: String,
    pub projection: Vec<String>,
}

/// One line of the catalog listing shown in help output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogListing {
    pub address: String,
    pub help: String,
    pub verified: bool,
    pub depth: usize,
}

/// Source of answers for catalog prompts
///
/// `ask` returns `None` when no more input is available.
pub trait Prompter {
    fn ask(&mut self, question: &str, pattern: &str) -> Option<String>;
}

impl<F> Prompter for F
where
    F: FnMut(&str, &str) -> Option<String>,
{
    fn ask(&mut self, question: &str, pattern: &str) -> Option<String> {
        self(question, pattern)
    }
}

/// Immutable, addressable tree of canned searches
#[derive(Debug, Clone)]
pub struct CatalogTree {
    roots: Vec<CatalogEntry>,
}

impl CatalogTree {
    /// Builds a tree, checking every template against its prompts
    pub fn new(roots: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        roots.iter().try_for_each(CatalogEntry::check)?;
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[CatalogEntry] {
        &self.roots
    }

    /// Looks up the entry at a dotted address
    pub fn entry(&self, address: &str) -> Option<&CatalogEntry> {
        let path = parse_address(address)?;
        let (last, parents) = path.split_last()?;

        let mut level = &self.roots;
        for index in parents {
            level = &level.get(index - 1)?.children;
        }
        level.get(last - 1)
    }

    /// Resolves an address into a runnable filter
    ///
    /// Preseeded answers are used positionally when they pass validation.
    /// Any prompt without a usable preseeded answer is asked through
    /// `prompter` until a valid answer arrives.
    ///
    /// # Errors
    /// * `CatalogError::NotFound` - the address is malformed or out of range
    /// * `CatalogError::PromptClosed` - the prompter ran out of input
    pub fn resolve<P: Prompter + ?Sized>(
        &self,
        address: &str,
        preseeded: &[String],
        prompter: &mut P,
    ) -> Result<ResolvedQuery, CatalogError> {
        let entry = self
            .entry(address)
            .ok_or_else(|| CatalogError::NotFound(address.to_string()))?;

        debug!("Resolving canned search {}: {}", address, entry.help);

        let mut answers = Vec::with_capacity(entry.prompts.len());

        for (index, prompt) in entry.prompts.iter().enumerate() {
            if let Some(seeded) = preseeded.get(index) {
                if prompt.pattern.matches(seeded) {
                    answers.push(escape_filter_value(seeded));
                    continue;
                }
                debug!("Discarding preseeded answer {} for \"{}\"", index, prompt.question);
            }

            loop {
                let answer = prompter
                    .ask(&prompt.question, prompt.pattern.as_str())
                    .ok_or_else(|| CatalogError::PromptClosed(prompt.question.clone()))?;

                if prompt.pattern.matches(&answer) {
                    answers.push(escape_filter_value(&answer));
                    break;
                }
                debug!("Answer rejected by pattern {}", prompt.pattern.as_str());
            }
        }

        Ok(ResolvedQuery {
            filter: entry.template.render(&answers),
            projection: entry.projection.clone(),
        })
    }

    /// Every entry with its address, in authoring order
    pub fn list_addresses(&self) -> Vec<CatalogListing> {
        let mut listing = Vec::new();
        collect_listing(&self.roots, "", 0, &mut listing);
        listing
    }

    /// Renders the listing as the help epilog
    pub fn render_help(&self) -> String {
        let mut help = String::from("Custom Searches:\n");

        for item in self.list_addresses() {
            let number = if item.depth == 0 {
                format!("{:>2}", item.address)
            } else {
                item.address.clone()
            };
            help.push_str(&format!(
                "{}{}{}) {}\n",
                "\t".repeat(item.depth + 1),
                if item.verified { ' ' } else { '*' },
                number,
                item.help
            ));
        }

        help.push_str(
            "\nStarred items have never been verified against a live directory, results may vary.",
        );
        help
    }
}

fn collect_listing(
    entries: &[CatalogEntry],
    parent: &str,
    depth: usize,
    listing: &mut Vec<CatalogListing>,
) {
    for (index, entry) in entries.iter().enumerate() {
        let address = format!("{}{}", parent, index + 1);
        listing.push(CatalogListing {
            address: address.clone(),
            help: entry.help.clone(),
            verified: entry.verified,
            depth,
        });
        collect_listing(&entry.children, &format!("{}.", address), depth + 1, listing);
    }
}

/// Converts a timestamp into the FILETIME string AD uses for `lastLogonTimestamp`
pub fn ldap_timestamp(at: DateTime<Utc>) -> String {
    (at.timestamp() * 10_000_000 + FILETIME_UNIX_OFFSET).to_string()
}

/// The built-in catalog of Active Directory reconnaissance searches
///
/// The "active computers" searches cover machines that logged on in the
/// 90 days before `now`.
pub fn builtin_catalog(now: DateTime<Utc>) -> Result<CatalogTree, CatalogError> {
    let active_since = ldap_timestamp(now - Duration::days(90));

    let user_attrs = ["cn", "description", "mail", "memberOf", "sAMAccountName"];
    let group_attrs = ["member", "displayName"];
    let computer_attrs = [
        "dNSHostName",
        "description",
        "operatingSystem",
        "operatingSystemServicePack",
        "operatingSystemVersion",
        "servicePrincipalName",
        "lastLogonTimestamp",
    ];
    let kerberoastable = "(&(servicePrincipalName=*)(UserAccountControl:1.2.840.113556.1.4.803:=512)(!(UserAccountControl:1.2.840.113556.1.4.803:=2))(!(objectCategory=computer))";

    CatalogTree::new(vec![
        CatalogEntry::new("Get all users", "(objectcategory=user)")
            .project(&user_attrs)
            .child(
                CatalogEntry::new(
                    "Get specific user (You will be prompted for the username)",
                    "(&(objectclass=user)(|(CN={0})(sAMAccountName={0})))",
                )
                .project(&user_attrs)
                .prompt(Prompt::new("Username to search for", NON_EMPTY_PATTERN)?),
            ),
        CatalogEntry::new("Get all groups (and their members)", "(objectclass=group)")
            .project(&group_attrs)
            .child(
                CatalogEntry::new(
                    "Get specific group (You will be prompted for the group name)",
                    "(&(objectclass=group)(|(CN={0})(sAMAccountName={0})))",
                )
                .project(&group_attrs)
                .prompt(Prompt::new("Group name to search for", NON_EMPTY_PATTERN)?),
            ),
        CatalogEntry::new("Get all printers", "(objectCategory=printQueue)"),
        CatalogEntry::new(
            "Get all computers",
            &format!("(&(objectCategory=computer)(lastLogonTimestamp>={}))", active_since),
        )
        .project(&computer_attrs)
        .child(
            CatalogEntry::new(
                "Get specific computer (You will be prompted for the computer name)",
                &format!(
                    "(&(objectCategory=computer)(lastLogonTimestamp>={})(|(CN={{0}})(dNSHostName={{0}})))",
                    active_since
                ),
            )
            .project(&computer_attrs)
            .prompt(Prompt::new("Computer name to search for", HOSTNAME_PATTERN)?),
        ),
        CatalogEntry::new(
            "Get Domain/Enterprise Administrators",
            "(&(objectCategory=group)(|(CN=Domain Admins)(CN=Administrators)(CN=Enterprise Admins)))",
        )
        .project(&["member"]),
        CatalogEntry::new("Get Domain Trusts", "(objectClass=trustedDomain)"),
        CatalogEntry::new(
            "Search for Unconstrained SPN Delegations (Potential Priv-Esc)",
            "(userAccountControl:1.2.840.113556.1.4.803:=524288)",
        )
        .project(&["cn", "servicePrincipalName"]),
        CatalogEntry::new(
            "Search for Accounts where PreAuth is not required. (ASREPROAST)",
            "(userAccountControl:1.2.840.113556.1.4.803:=4194304)",
        )
        .project(&["cn", "distinguishedName"]),
        CatalogEntry::new("Search for User SPNs (KERBEROAST)", &format!("{})", kerberoastable))
            .project(&["userPrincipalName", "servicePrincipalName"])
            .child(
                CatalogEntry::new(
                    "Search for specific User SPN (You will be prompted for the User Principal Name)",
                    &format!("{}(userPrincipalName={{0}}))", kerberoastable),
                )
                .project(&["userPrincipalName", "servicePrincipalName"])
                .prompt(Prompt::new("User Principal Name to search for", NON_EMPTY_PATTERN)?),
            ),
        CatalogEntry::new("Show All LAPS LA Passwords (that you can see)", "(ms-Mcs-AdmPwd=*)")
            .project(&["ms-Mcs-AdmPwd", "ms-Mcs-AdmPwdExpirationTime"])
            .unverified(),
        CatalogEntry::new(
            "Search for common plaintext password attributes (UserPassword, UnixUserPassword, unicodePwd, and msSFU30Password)",
            "(|(UserPassword=*)(UnixUserPassword=*)(unicodePwd=*)(msSFU30Password=*))",
        )
        .unverified(),
        CatalogEntry::new(
            "Show All Quest Two-Factor Seeds (if you have access)",
            "(defender-tokenData=*)",
        ),
        CatalogEntry::new(
            "Oracle \"orclCommonAttribute\" SSO password hash",
            "(&(objectcategory=user)(orclCommonAttribute=*))",
        )
        .project(&["cn", "memberOf", "sAMAccountName", "orclCommonAttribute"]),
        CatalogEntry::new(
            "Oracle \"userPassword\" SSO password hash",
            "(&(objectcategory=user)(userPassword=*))",
        )
        .project(&["cn", "memberOf", "sAMAccountName", "userPassword"])
        .unverified(),
    ])
}
