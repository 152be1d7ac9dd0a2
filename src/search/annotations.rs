//! Annotation merge across the two enrichment schema generations.
//!
//! The old schema tags primary subjects with `majorMentions`; the new one
//! uses `implicitlyAbout` and `hasDisplayTag`. An article is classified
//! once, by the first signature predicate found, and all of its
//! annotations are then mapped under that schema.

use crate::models::{Annotation, CanonicalAnnotation, MergedAnnotations, Role, Schema};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Predicates the merge understands, keyed by the last URI segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    About,
    ImplicitlyAbout,
    HasDisplayTag,
    MajorMentions,
    Mentions,
    IsClassifiedBy,
    ImplicitlyClassifiedBy,
    IsPrimarilyClassifiedBy,
}

impl Predicate {
    /// Parse a predicate URI such as `http://.../annotation/about`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (_, suffix) = uri.rsplit_once('/')?;
        match suffix {
            "about" => Some(Predicate::About),
            "implicitlyAbout" => Some(Predicate::ImplicitlyAbout),
            "hasDisplayTag" => Some(Predicate::HasDisplayTag),
            "majorMentions" => Some(Predicate::MajorMentions),
            "mentions" => Some(Predicate::Mentions),
            "isClassifiedBy" => Some(Predicate::IsClassifiedBy),
            "implicitlyClassifiedBy" => Some(Predicate::ImplicitlyClassifiedBy),
            "isPrimarilyClassifiedBy" => Some(Predicate::IsPrimarilyClassifiedBy),
            _ => None,
        }
    }

    /// The schema this predicate identifies, if it is a signature.
    fn signature(&self) -> Option<Schema> {
        match self {
            Predicate::MajorMentions => Some(Schema::Old),
            Predicate::ImplicitlyAbout | Predicate::HasDisplayTag => Some(Schema::New),
            _ => None,
        }
    }
}

/// An article's annotations tagged with their detected schema.
#[derive(Debug, Clone, Copy)]
pub enum AnnotationSet<'a> {
    Old(&'a [Annotation]),
    New(&'a [Annotation]),
}

impl<'a> AnnotationSet<'a> {
    /// Classify by the first signature predicate; new schema when none is present.
    pub fn detect(annotations: &'a [Annotation]) -> Self {
        let schema = annotations
            .iter()
            .filter_map(|anno| Predicate::from_uri(&anno.predicate))
            .find_map(|predicate| predicate.signature())
            .unwrap_or(Schema::New);

        match schema {
            Schema::Old => AnnotationSet::Old(annotations),
            Schema::New => AnnotationSet::New(annotations),
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            AnnotationSet::Old(_) => Schema::Old,
            AnnotationSet::New(_) => Schema::New,
        }
    }

    fn annotations(&self) -> &'a [Annotation] {
        match self {
            AnnotationSet::Old(annotations) | AnnotationSet::New(annotations) => annotations,
        }
    }

    /// Map every annotation into the merged view, registering each in `lookup`.
    pub fn canonicalize(&self, lookup: &AnnotationLookup) -> MergedAnnotations {
        let schema = self.schema();
        let mut merged = MergedAnnotations::empty(schema);

        for anno in self.annotations() {
            let csv = anno.csv();
            lookup.register(csv.clone(), anno.clone());

            if anno.kind == "GENRE" {
                merged.genre = Some(anno.pref_label.clone());
            }

            let mut canonical = CanonicalAnnotation {
                kind: anno.kind.clone(),
                label: anno.pref_label.clone(),
                taxonomy_csv: csv.clone(),
                role: None,
                is_primary_theme: false,
                is_primary_classification: false,
            };

            match Predicate::from_uri(&anno.predicate) {
                Some(Predicate::About) => {
                    merged.abouts.push(csv.clone());
                    canonical.role = Some(Role::About);
                    if schema == Schema::Old && merged.primary_theme.is_none() {
                        merged.primary_theme = Some(csv.clone());
                        canonical.is_primary_theme = true;
                    }
                }
                Some(Predicate::MajorMentions) => {
                    merged.abouts.push(csv.clone());
                    canonical.role = Some(Role::About);
                }
                Some(Predicate::HasDisplayTag) => {
                    if schema == Schema::New {
                        merged.primary_theme = Some(csv.clone());
                        canonical.is_primary_theme = true;
                    }
                }
                Some(Predicate::ImplicitlyAbout) => {
                    merged.implicitly_abouts.push(csv.clone());
                    canonical.role = Some(Role::ImplicitlyAbout);
                }
                Some(Predicate::Mentions) => {
                    merged.mentions.push(csv.clone());
                    canonical.role = Some(Role::Mention);
                }
                Some(Predicate::IsClassifiedBy) => {
                    merged.classified_bys.push(csv.clone());
                    canonical.role = Some(Role::ClassifiedBy);
                }
                Some(Predicate::ImplicitlyClassifiedBy) => {
                    merged.implicitly_classified_bys.push(csv.clone());
                    canonical.role = Some(Role::ImplicitlyClassifiedBy);
                }
                Some(Predicate::IsPrimarilyClassifiedBy) => {
                    merged.primarily_classified_by = Some(csv.clone());
                    canonical.is_primary_classification = true;
                }
                None => {}
            }

            merged.annotations.push(canonical);
        }

        // A later hasDisplayTag replaces the theme; keep the flags consistent.
        if let Some(theme) = &merged.primary_theme {
            for canonical in &mut merged.annotations {
                canonical.is_primary_theme &= &canonical.taxonomy_csv == theme;
            }
        }

        merged
    }
}

/// Last-seen full annotation for each `TYPE:label` key.
///
/// Shared by every enrichment in a process run; later writes replace
/// earlier ones and entries are never removed.
#[derive(Debug, Default)]
pub struct AnnotationLookup {
    entries: RwLock<HashMap<String, Annotation>>,
}

impl AnnotationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, csv: String, annotation: Annotation) {
        self.entries.write().insert(csv, annotation);
    }

    pub fn get(&self, csv: &str) -> Option<Annotation> {
        self.entries.read().get(csv).cloned()
    }

    /// Resolve each key that is known, skipping the rest.
    pub fn resolve<'k>(&self, csvs: impl IntoIterator<Item = &'k String>) -> BTreeMap<String, Annotation> {
        csvs.into_iter()
            .filter_map(|csv| self.get(csv).map(|anno| (csv.clone(), anno)))
            .collect()
    }
}
