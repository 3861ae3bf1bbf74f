use crate::models::CrisisCategory;

/// Fixed intervention text shown instead of a generated reply when the
/// lexical matcher blocks a message. Helpline numbers are India-specific.
pub const fn crisis_response(category: CrisisCategory) -> &'static str {
    match category {
        CrisisCategory::SuicidalIdeation => {
            "I'm really glad you told me, and I'm worried about you. Please reach out right \
             now: AASRA 022 2754 6669, Kiran helpline 1800-599-0019, Tele Manas \
             1800-891-4416, or emergency services 112. You're not alone, and people are \
             ready to help you through this."
        }
        CrisisCategory::SelfHarm => {
            "It sounds like you're carrying a lot of pain right now. Please talk to someone \
             who can support you safely: Kiran helpline 1800-599-0019, AASRA 022 2754 6669, \
             or emergency services 112. You deserve care, not hurt."
        }
        CrisisCategory::HarmToOthers => {
            "Thank you for being honest about these thoughts. They are serious, and \
             professional support can help: Mental health crisis line 1800-599-0019, police \
             100, or emergency services 112. Please reach out right away."
        }
        CrisisCategory::Abuse => {
            "What you're describing is not okay, and it is not your fault. Please reach out \
             for help: AASRA 022 2754 6669, Women helpline 1091, Child helpline 1098, or \
             police 100. These lines are available 24/7 and you're not alone."
        }
    }
}

/// Replacement text when a generated reply fails the outbound safety check.
pub const fn generic_safety_response() -> &'static str {
    "I want to make sure you get the right kind of support. If you're in immediate \
     danger, please contact emergency services 112 or the Kiran helpline 1800-599-0019. \
     I'm here with you, and professional help is available around the clock."
}
