//! Ontology Knowledge
//!
//! Slot semantics of the slot-based medical ontology. The `MED` table stores
//! one row per (CODE, SLOT_NUMBER, SLOT_VALUE) triple and `MED_SLOTS` names
//! each slot number.

use serde::Serialize;

/// Concept table: CODE, SLOT_NUMBER, SLOT_VALUE
pub const MED_TABLE: &str = "MED";

/// Slot definition table: SLOT_NUMBER, SLOT_NAME
pub const MED_SLOTS_TABLE: &str = "MED_SLOTS";

/// Whether a slot holds a literal or points at another concept's CODE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotValueKind {
    Literal,
    Reference,
}

/// A slot number the assistant knows the meaning of
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SlotDefinition {
    pub number: u32,
    pub name: &'static str,
    pub kind: SlotValueKind,
    pub meaning: &'static str,
}

pub const PRINT_NAME: u32 = 6;
pub const INDICATES_PROBLEM: u32 = 150;
pub const LOINC_CODE: u32 = 212;
pub const SNOMED_CODE: u32 = 266;

/// Slots worth explaining to the model; the full list lives in `MED_SLOTS`.
pub const KEY_SLOTS: &[SlotDefinition] = &[
    SlotDefinition {
        number: 3,
        name: "DESCENDANT-OF",
        kind: SlotValueKind::Reference,
        meaning: "semantic hierarchy; CODE is a descendant of SLOT_VALUE",
    },
    SlotDefinition {
        number: 4,
        name: "SUBCLASS-OF",
        kind: SlotValueKind::Reference,
        meaning: "semantic classification; CODE is a subclass of SLOT_VALUE",
    },
    SlotDefinition {
        number: PRINT_NAME,
        name: "PRINT-NAME",
        kind: SlotValueKind::Literal,
        meaning: "human-readable name of the concept",
    },
    SlotDefinition {
        number: 9,
        name: "CPMC-LAB-PROC-CODE",
        kind: SlotValueKind::Literal,
        meaning: "institutional procedure code",
    },
    SlotDefinition {
        number: 15,
        name: "MEASURED-BY-PROCEDURE",
        kind: SlotValueKind::Reference,
        meaning: "CODE is measured by the SLOT_VALUE procedure",
    },
    SlotDefinition {
        number: 16,
        name: "ENTITY-MEASURED",
        kind: SlotValueKind::Reference,
        meaning: "what this test or procedure measures",
    },
    SlotDefinition {
        number: 20,
        name: "CPMC-LAB-TEST-CODE",
        kind: SlotValueKind::Literal,
        meaning: "institutional test code",
    },
    SlotDefinition {
        number: 149,
        name: "PT-PROBLEM-(INDICATED-BY)->PROCEDURE",
        kind: SlotValueKind::Reference,
        meaning: "inverse link: procedures indicated by this problem",
    },
    SlotDefinition {
        number: INDICATES_PROBLEM,
        name: "PROCEDURE-(INDICATES)->PT-PROBLEM",
        kind: SlotValueKind::Reference,
        meaning: "forward link: SLOT_VALUE is the CODE of a problem this procedure indicates",
    },
    SlotDefinition {
        number: LOINC_CODE,
        name: "LOINC-CODE",
        kind: SlotValueKind::Literal,
        meaning: "standardized LOINC code such as '2947-0'",
    },
    SlotDefinition {
        number: 264,
        name: "MILLENNIUM-LAB-CODE",
        kind: SlotValueKind::Literal,
        meaning: "system-specific lab code",
    },
    SlotDefinition {
        number: SNOMED_CODE,
        name: "SNOMED-CODE",
        kind: SlotValueKind::Literal,
        meaning: "standardized SNOMED CT code",
    },
    SlotDefinition {
        number: 277,
        name: "EPIC-COMPONENT-ID",
        kind: SlotValueKind::Literal,
        meaning: "EHR integration identifier",
    },
];

/// Look up a key slot by number
pub fn slot(number: u32) -> Option<&'static SlotDefinition> {
    KEY_SLOTS.iter().find(|s| s.number == number)
}

/// Render the key slot table as prompt lines
pub fn describe_key_slots() -> String {
    KEY_SLOTS
        .iter()
        .map(|s| {
            let kind = match s.kind {
                SlotValueKind::Literal => "literal",
                SlotValueKind::Reference => "reference to CODE",
            };
            format!("- Slot {}: {} ({}; {})", s.number, s.name, s.meaning, kind)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lookup() {
        assert_eq!(slot(LOINC_CODE).map(|s| s.name), Some("LOINC-CODE"));
        assert_eq!(slot(INDICATES_PROBLEM).map(|s| s.kind), Some(SlotValueKind::Reference));
        assert!(slot(9999).is_none());
    }

    #[test]
    fn test_describe_key_slots_lists_every_slot() {
        let text = describe_key_slots();
        assert_eq!(text.lines().count(), KEY_SLOTS.len());
        assert!(text.contains("Slot 266: SNOMED-CODE"));
    }
}
