//! Issue notification rendering for Slack bridge dispatch flows.

use srb_redmine::{Issue, IssueLinkBuilder, NamedRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Visual emphasis of a notification, derived from issue state.
pub enum Emphasis {
    Resolved,
    Alert,
    Neutral,
}

impl Emphasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Alert => "alert",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationField {
    pub title: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Platform-neutral notification rendered from one issue.
pub struct NotificationPayload {
    pub title: String,
    pub title_link: String,
    pub fields: Vec<NotificationField>,
    pub emphasis: Emphasis,
}

/// Render an issue into a notification payload.
///
/// Field order is fixed: Project, Status, Author, Assigned To, Category, Version, with
/// Priority appended only for high-priority issues. Closed takes precedence over high
/// priority when choosing the emphasis.
pub fn render_issue_notification<C, H>(
    issue: &Issue,
    links: &IssueLinkBuilder,
    is_closed: C,
    is_high_priority: H,
) -> NotificationPayload
where
    C: Fn(&Issue) -> bool,
    H: Fn(&Issue) -> bool,
{
    let closed = is_closed(issue);
    let high_priority = is_high_priority(issue);

    let title = match &issue.tracker {
        Some(tracker) => format!("{} #{}: {}", tracker.name, issue.id, issue.subject),
        None => format!("#{}: {}", issue.id, issue.subject),
    };

    let mut fields = [
        ("Project", &issue.project),
        ("Status", &issue.status),
        ("Author", &issue.author),
        ("Assigned To", &issue.assigned_to),
        ("Category", &issue.category),
        ("Version", &issue.fixed_version),
    ]
    .into_iter()
    .filter_map(|(title, association)| named_field(title, association.as_ref()))
    .collect::<Vec<_>>();
    if high_priority {
        fields.extend(named_field("Priority", issue.priority.as_ref()));
    }

    let emphasis = if closed {
        Emphasis::Resolved
    } else if high_priority {
        Emphasis::Alert
    } else {
        Emphasis::Neutral
    };

    NotificationPayload {
        title,
        title_link: links.issue_url(issue.id),
        fields,
        emphasis,
    }
}

fn named_field(title: &str, association: Option<&NamedRef>) -> Option<NotificationField> {
    association.map(|named| NotificationField {
        title: title.to_string(),
        value: named.name.clone(),
    })
}
