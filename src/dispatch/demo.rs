//! Static content served when no text-generation credential is configured.
//!
//! Selection is driven by an explicit [`SectionType`] passed with the
//! request, never by inspecting prompt text. Output is deterministic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Model label attached to every fallback result.
pub const DEMO_MODEL: &str = "demo";

/// Kind of clinical text a completion request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    /// PHSB intake card: patient need, history, impairments, limitations.
    Intake,
    /// SOAP progress note.
    Soap,
    /// Red-flag screening.
    RedFlags,
    /// Treatment plan with goals.
    TreatmentPlan,
    /// Session summary.
    Summary,
    #[default]
    General,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Soap => "soap",
            Self::RedFlags => "red_flags",
            Self::TreatmentPlan => "treatment_plan",
            Self::Summary => "summary",
            Self::General => "general",
        }
    }
}

const INTAKE: &str = "\
**P - Patiëntbehoefte:** Patiënt wil weer pijnvrij kunnen hardlopen en zonder beperkingen werken.

**H - Historie:** Sinds 3 weken geleidelijk toenemende pijn aan de rechterknie na verhoging van de trainingsintensiteit. Geen trauma. Pijn verergert bij traplopen en hurken.

**S - Stoornissen in lichaamsfuncties en anatomische structuren:** Drukpijn laterale gewrichtsspleet, beperkte flexie (110°), verminderde kracht quadriceps rechts.

**B - Beperkingen in activiteiten en participatie:** Hardlopen niet mogelijk, traplopen pijnlijk, langdurig zitten geeft stijfheid.

**Rode Vlagen:**
- Geen nachtelijke pijn
- Geen onverklaard gewichtsverlies

*Demo-inhoud: configureer een API-sleutel voor gegenereerde verslaglegging.*";

const SOAP: &str = "\
**S - Subjectief:** Patiënt rapporteert afname van pijn (NPRS 4/10, was 6/10). Traplopen gaat beter.

**O - Objectief:** Flexie rechterknie 125°, kracht quadriceps 4+/5. Geen zwelling.

**A - Analyse:** Herstel verloopt volgens verwachting; belastbaarheid neemt toe.

**P - Plan:** Oefenprogramma uitbreiden met excentrische training, opbouwschema hardlopen starten. Controle over 2 weken.

*Demo-inhoud: configureer een API-sleutel voor gegenereerde verslaglegging.*";

const RED_FLAGS: &str = "\
**Rode Vlagen:**
- Geen nachtelijke pijn gerapporteerd
- Geen koorts of algemene malaise
- Geen neurologische uitval

Conclusie: geen indicatie voor verwijzing.

*Demo-inhoud: configureer een API-sleutel voor gegenereerde verslaglegging.*";

const TREATMENT_PLAN: &str = "\
**Hoofddoel:** Binnen 8 weken pijnvrij 5 km hardlopen.

**Subdoelen:**
1. Binnen 2 weken pijnvrij traplopen.
2. Binnen 4 weken volledige flexie rechterknie.
3. Binnen 6 weken hardloopopbouw tot 3 km.

**Interventies:** Oefentherapie (kracht en stabiliteit), educatie over belastbaarheid, geleidelijke opbouw van loopbelasting.

*Demo-inhoud: configureer een API-sleutel voor gegenereerde verslaglegging.*";

const SUMMARY: &str = "\
Patiënt met belastingsgerelateerde knieklachten rechts. Klachten nemen af onder oefentherapie; geen rode vlagen. Behandeling wordt voortgezet volgens plan.

*Demo-inhoud: configureer een API-sleutel voor gegenereerde verslaglegging.*";

const GENERAL: &str = "\
Dit is voorbeeldinhoud. Er is geen API-sleutel geconfigureerd, daarom wordt statische demonstratietekst getoond in plaats van gegenereerde verslaglegging.";

/// Deterministic fallback text for a section type. Never empty.
pub fn content_for(section: SectionType) -> &'static str {
    match section {
        SectionType::Intake => INTAKE,
        SectionType::Soap => SOAP,
        SectionType::RedFlags => RED_FLAGS,
        SectionType::TreatmentPlan => TREATMENT_PLAN,
        SectionType::Summary => SUMMARY,
        SectionType::General => GENERAL,
    }
}
