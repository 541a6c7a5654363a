use crate::models::{ActivityMetadata, ActivityRecord, ContentItem, SourceKind};

/// Borrowed view over the fields concept extraction inspects. Both activity
/// records and structured content items normalize into this shape.
#[derive(Debug, Clone, Copy)]
pub struct ConceptSource<'a> {
    pub kind: SourceKind,
    pub metadata: &'a ActivityMetadata,
    pub topic_name: Option<&'a str>,
    pub unit_name: Option<&'a str>,
    pub module_name: Option<&'a str>,
    pub lesson_id: Option<&'a str>,
    pub course_id: Option<&'a str>,
    pub quiz_id: Option<&'a str>,
}

impl ActivityRecord {
    pub fn concept_source(&self) -> ConceptSource<'_> {
        ConceptSource {
            kind: self.kind.into(),
            metadata: &self.metadata,
            topic_name: self.topic_name.as_deref(),
            unit_name: self.unit_name.as_deref(),
            module_name: self.module_name.as_deref(),
            lesson_id: self.lesson_id.as_deref(),
            course_id: self.course_id.as_deref(),
            quiz_id: self.quiz_id.as_deref(),
        }
    }
}

impl ContentItem {
    pub fn concept_source(&self) -> ConceptSource<'_> {
        ConceptSource {
            kind: SourceKind::Content,
            metadata: &self.metadata,
            topic_name: None,
            unit_name: None,
            module_name: Some(&self.module_name),
            lesson_id: self.lesson_id.as_deref(),
            course_id: self.course_id.as_deref(),
            quiz_id: None,
        }
    }
}

/// Derives the set of concept labels for one record via the fallback chain:
/// explicit metadata concepts (or the single concept string when the list is
/// empty), the metadata topic, structural names, then synthetic labels from
/// lesson/course ids. Quiz-sourced records with nothing found get a synthetic
/// `quiz_<id>` label as a last resort. Deterministic, no side effects; output
/// is de-duplicated and blank-free, in encounter order.
pub fn extract_concepts(source: &ConceptSource<'_>) -> Vec<String> {
    let mut concepts = Vec::new();

    if source.metadata.concepts.is_empty() {
        if let Some(concept) = &source.metadata.concept {
            push_concept(&mut concepts, concept);
        }
    } else {
        for concept in &source.metadata.concepts {
            push_concept(&mut concepts, concept);
        }
    }

    if let Some(topic) = &source.metadata.topic {
        push_concept(&mut concepts, topic);
    }

    for structural in [source.topic_name, source.unit_name, source.module_name]
        .into_iter()
        .flatten()
    {
        push_concept(&mut concepts, structural);
    }

    if let Some(lesson_id) = source.lesson_id {
        if !lesson_id.trim().is_empty() {
            push_concept(&mut concepts, &format!("lesson_{}", lesson_id.trim()));
        }
    }
    if let Some(course_id) = source.course_id {
        if !course_id.trim().is_empty() {
            push_concept(&mut concepts, &format!("course_{}", course_id.trim()));
        }
    }

    if concepts.is_empty() && source.kind == SourceKind::Quiz {
        if let Some(quiz_id) = source.quiz_id {
            if !quiz_id.trim().is_empty() {
                push_concept(&mut concepts, &format!("quiz_{}", quiz_id.trim()));
            }
        }
    }

    concepts
}

fn push_concept(concepts: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    if concepts.iter().any(|existing| existing == trimmed) {
        return;
    }
    concepts.push(trimmed.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityMetadata;

    fn meta(concepts: &[&str], concept: Option<&str>, topic: Option<&str>) -> ActivityMetadata {
        ActivityMetadata {
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            concept: concept.map(|c| c.to_string()),
            topic: topic.map(|t| t.to_string()),
        }
    }

    fn source<'a>(kind: SourceKind, metadata: &'a ActivityMetadata) -> ConceptSource<'a> {
        ConceptSource {
            kind,
            metadata,
            topic_name: None,
            unit_name: None,
            module_name: None,
            lesson_id: None,
            course_id: None,
            quiz_id: None,
        }
    }

    #[test]
    fn explicit_concept_list_wins_over_single_concept() {
        let metadata = meta(&["fractions", "decimals"], Some("ignored"), None);
        let concepts = extract_concepts(&source(SourceKind::Quiz, &metadata));
        assert_eq!(concepts, vec!["fractions", "decimals"]);
    }

    #[test]
    fn single_concept_used_when_list_empty() {
        let metadata = meta(&[], Some("fractions"), None);
        let concepts = extract_concepts(&source(SourceKind::Lesson, &metadata));
        assert_eq!(concepts, vec!["fractions"]);
    }

    #[test]
    fn topic_is_additive_not_exclusive() {
        let metadata = meta(&["fractions"], None, Some("arithmetic"));
        let concepts = extract_concepts(&source(SourceKind::Quiz, &metadata));
        assert_eq!(concepts, vec!["fractions", "arithmetic"]);
    }

    #[test]
    fn structural_fields_and_ids_become_concepts() {
        let metadata = ActivityMetadata::default();
        let mut src = source(SourceKind::Lesson, &metadata);
        src.topic_name = Some("geometry");
        src.unit_name = Some("unit 3");
        src.module_name = Some("shapes");
        src.lesson_id = Some("L7");
        src.course_id = Some("C2");
        let concepts = extract_concepts(&src);
        assert_eq!(
            concepts,
            vec!["geometry", "unit 3", "shapes", "lesson_L7", "course_C2"]
        );
    }

    #[test]
    fn quiz_fallback_only_when_nothing_else_found() {
        let metadata = ActivityMetadata::default();
        let mut src = source(SourceKind::Quiz, &metadata);
        src.quiz_id = Some("Q9");
        assert_eq!(extract_concepts(&src), vec!["quiz_Q9"]);

        src.topic_name = Some("algebra");
        assert_eq!(extract_concepts(&src), vec!["algebra"]);
    }

    #[test]
    fn no_quiz_fallback_for_non_quiz_sources() {
        let metadata = ActivityMetadata::default();
        let src = source(SourceKind::Assignment, &metadata);
        assert!(extract_concepts(&src).is_empty());
    }

    #[test]
    fn blanks_and_duplicates_removed() {
        let metadata = meta(&["  ", "fractions", "fractions", " decimals "], None, None);
        let concepts = extract_concepts(&source(SourceKind::Quiz, &metadata));
        assert_eq!(concepts, vec!["fractions", "decimals"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let metadata = meta(&["a", "b"], None, Some("c"));
        let mut src = source(SourceKind::Quiz, &metadata);
        src.module_name = Some("m");
        let first = extract_concepts(&src);
        let second = extract_concepts(&src);
        assert_eq!(first, second);
    }
}
