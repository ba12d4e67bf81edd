use crate::types::SeoMeta;
use std::fmt;

/// The labels a generation reply is divided into. Each section starts
/// on a line with its label and a colon and runs until the next label
/// or end of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLabel {
    Title,
    Content,
    Tags,
    SeoTitle,
    FocusKeyphrase,
    Slug,
    MetaDescription,
}

impl SectionLabel {
    pub const ALL: [SectionLabel; 7] = [
        SectionLabel::Title,
        SectionLabel::Content,
        SectionLabel::Tags,
        SectionLabel::SeoTitle,
        SectionLabel::FocusKeyphrase,
        SectionLabel::Slug,
        SectionLabel::MetaDescription,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SectionLabel::Title => "Title",
            SectionLabel::Content => "Content",
            SectionLabel::Tags => "Tags",
            SectionLabel::SeoTitle => "SEO Title",
            SectionLabel::FocusKeyphrase => "Focus Keyphrase",
            SectionLabel::Slug => "Slug",
            SectionLabel::MetaDescription => "Meta Description",
        }
    }
}

/// The fields a successful generation attempt yields.
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    pub title: String,
    pub body: String,
    pub tags: Option<String>,
    pub seo: SeoMeta,
}

/// Mandatory sections that could not be located in a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSections(pub Vec<&'static str>);

impl fmt::Display for MissingSections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing sections: {}", self.0.join(", "))
    }
}

/// Split a reply into (label, body) pairs. Text before the first
/// label is preamble and is dropped; unlabeled lines belong to the
/// section opened above them.
pub fn tokenize(text: &str) -> Vec<(SectionLabel, String)> {
    let mut sections: Vec<(SectionLabel, String)> = Vec::new();

    for line in text.lines() {
        if let Some((label, first)) = match_label(line) {
            sections.push((label, first));
        } else if let Some((_, body)) = sections.last_mut() {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(line);
        }
    }

    for (_, body) in sections.iter_mut() {
        *body = body.trim().to_string();
    }

    sections
}

/// Parse a reply into article fields. Title and Content are
/// mandatory; everything else is carried through when present.
pub fn parse_article(text: &str) -> std::result::Result<ParsedArticle, MissingSections> {
    let sections = tokenize(text);

    let find = |label: SectionLabel| -> Option<String> {
        sections
            .iter()
            .find(|(l, body)| *l == label && !body.is_empty())
            .map(|(_, body)| body.clone())
    };

    let title = find(SectionLabel::Title);
    let body = find(SectionLabel::Content);

    let mut missing = Vec::new();
    if title.is_none() {
        missing.push(SectionLabel::Title.name());
    }
    if body.is_none() {
        missing.push(SectionLabel::Content.name());
    }
    if !missing.is_empty() {
        return Err(MissingSections(missing));
    }

    Ok(ParsedArticle {
        title: title.unwrap_or_default(),
        body: body.unwrap_or_default(),
        tags: find(SectionLabel::Tags),
        seo: SeoMeta {
            title: find(SectionLabel::SeoTitle),
            meta_description: find(SectionLabel::MetaDescription),
            focus_keyphrase: find(SectionLabel::FocusKeyphrase),
            slug: find(SectionLabel::Slug),
        },
    })
}

/// Try to read a section header out of one line. Models wrap labels
/// in list markers, headings, `$$` fences or bold asterisks; all of
/// those are stripped before the label itself is compared.
fn match_label(line: &str) -> Option<(SectionLabel, String)> {
    let stripped = strip_decorations(line);

    for label in SectionLabel::ALL {
        if let Some(after) = strip_prefix_ignore_case(stripped, label.name()) {
            let after = after
                .trim_start_matches(|c| c == '$' || c == '*')
                .trim_start();
            if let Some(body) = after.strip_prefix(':') {
                return Some((label, body.trim().to_string()));
            }
        }
    }

    None
}

fn strip_decorations(line: &str) -> &str {
    let mut rest = line.trim_start();
    loop {
        let before = rest;
        rest = rest.trim_start_matches(['#', '-', '*', '$']).trim_start();
        // list numbering like "3."
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 && rest[digits..].starts_with('.') {
            rest = rest[digits + 1..].trim_start();
        }
        if rest == before {
            return rest;
        }
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() < prefix.len() {
        return None;
    }
    let (head, tail) = text.split_at(prefix.len());
    if head.eq_ignore_ascii_case(prefix) {
        Some(tail)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN_REPLY: &str = "\
Title: Championship upset shakes the rankings
Content: The final set went to a tiebreak.
More analysis on the second line.
Tags: tournament, rankings
SEO Title: Championship upset analysis
Focus Keyphrase: championship upset
Slug: championship-upset
Meta Description: How the upset changed the rankings.";

    #[test]
    fn parses_plain_labels() {
        let article = parse_article(PLAIN_REPLY).unwrap();
        assert_eq!(article.title, "Championship upset shakes the rankings");
        assert!(article.body.starts_with("The final set went to a tiebreak."));
        assert!(article.body.contains("second line"));
        assert_eq!(article.tags.as_deref(), Some("tournament, rankings"));
        assert_eq!(article.seo.slug.as_deref(), Some("championship-upset"));
        assert_eq!(
            article.seo.meta_description.as_deref(),
            Some("How the upset changed the rankings.")
        );
    }

    #[test]
    fn parses_fenced_and_numbered_labels() {
        let reply = "\
1. $$title$$: Big win on clay
2. $$Content$$: A long rally decided it.
3. $$Tags$$: clay, finals
4. $$SEO Title$$: Big win on clay courts";
        let article = parse_article(reply).unwrap();
        assert_eq!(article.title, "Big win on clay");
        assert_eq!(article.body, "A long rally decided it.");
        assert_eq!(article.seo.title.as_deref(), Some("Big win on clay courts"));
    }

    #[test]
    fn parses_bulleted_bold_labels() {
        let reply = "\
- **Title**: Practice routines that work
- **Content**: Start with footwork drills.
- **Meta Description**: Drills for every level.";
        let article = parse_article(reply).unwrap();
        assert_eq!(article.title, "Practice routines that work");
        assert_eq!(
            article.seo.meta_description.as_deref(),
            Some("Drills for every level.")
        );
    }

    #[test]
    fn body_ends_at_next_label() {
        let sections = tokenize("Content: line one\nline two\nSlug: some-slug");
        assert_eq!(
            sections[0],
            (SectionLabel::Content, "line one\nline two".to_string())
        );
        assert_eq!(sections[1], (SectionLabel::Slug, "some-slug".to_string()));
    }

    #[test]
    fn missing_title_is_reported() {
        let err = parse_article("Content: body only").unwrap_err();
        assert_eq!(err.0, vec!["Title"]);
    }

    #[test]
    fn missing_content_is_reported() {
        let err = parse_article("Title: a headline with no article").unwrap_err();
        assert_eq!(err.0, vec!["Content"]);
    }

    #[test]
    fn label_mid_sentence_does_not_open_a_section() {
        let sections = tokenize("Content: the word Title appears here\nand Title without a colon");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].1.contains("without a colon"));
    }

    #[test]
    fn preamble_before_first_label_is_dropped() {
        let article =
            parse_article("Here is the article you asked for:\n\nTitle: T\nContent: C").unwrap();
        assert_eq!(article.title, "T");
        assert_eq!(article.body, "C");
    }
}
