use crate::constants::{EMERGENCY_HELPLINE, ENV_RELAY_KEY, ENV_RELAY_URL};
use crate::language::Language;

/// Canned reply used when the relay is not configured. No network access.
///
/// The message tells the operator which settings to fill in and always ends
/// with the emergency helpline.
pub fn fallback_reply(language: Language) -> String {
    let body = match language {
        Language::English => "The health assistant is not connected yet. Please ask the operator to configure the chat service.",
        Language::Hindi => "स्वास्थ्य सहायक अभी जुड़ा नहीं है। कृपया संचालक से चैट सेवा कॉन्फ़िगर करने के लिए कहें।",
        Language::Marathi => "आरोग्य सहाय्यक अद्याप जोडलेला नाही. कृपया संचालकाला चॅट सेवा कॉन्फिगर करण्यास सांगा.",
        Language::Tamil => "சுகாதார உதவியாளர் இன்னும் இணைக்கப்படவில்லை. அரட்டை சேவையை அமைக்க நிர்வாகியிடம் கேளுங்கள்.",
        Language::Telugu => "ఆరోగ్య సహాయకుడు ఇంకా కనెక్ట్ కాలేదు. దయచేసి చాట్ సేవను కాన్ఫిగర్ చేయమని నిర్వాహకుడిని అడగండి.",
        Language::Kannada => "ಆರೋಗ್ಯ ಸಹಾಯಕ ಇನ್ನೂ ಸಂಪರ್ಕಗೊಂಡಿಲ್ಲ. ದಯವಿಟ್ಟು ಚಾಟ್ ಸೇವೆಯನ್ನು ಕಾನ್ಫಿಗರ್ ಮಾಡಲು ನಿರ್ವಾಹಕರನ್ನು ಕೇಳಿ.",
        Language::Malayalam => "ആരോഗ്യ സഹായി ഇതുവരെ ബന്ധിപ്പിച്ചിട്ടില്ല. ചാറ്റ് സേവനം കോൺഫിഗർ ചെയ്യാൻ ഓപ്പറേറ്ററോട് ആവശ്യപ്പെടുക.",
        Language::Bengali => "স্বাস্থ্য সহকারী এখনও সংযুক্ত হয়নি। অনুগ্রহ করে অপারেটরকে চ্যাট পরিষেবা কনফিগার করতে বলুন।",
        Language::Gujarati => "આરોગ્ય સહાયક હજી જોડાયેલ નથી. કૃપા કરીને ઓપરેટરને ચેટ સેવા ગોઠવવા કહો.",
    };
    let emergency = match language {
        Language::English => "In an emergency, call",
        Language::Hindi => "आपातकाल में कॉल करें",
        Language::Marathi => "आणीबाणीच्या वेळी कॉल करा",
        Language::Tamil => "அவசரநிலையில் அழைக்கவும்",
        Language::Telugu => "అత్యవసర పరిస్థితిలో కాల్ చేయండి",
        Language::Kannada => "ತುರ್ತು ಸಂದರ್ಭದಲ್ಲಿ ಕರೆ ಮಾಡಿ",
        Language::Malayalam => "അടിയന്തര സാഹചര്യത്തിൽ വിളിക്കുക",
        Language::Bengali => "জরুরি অবস্থায় কল করুন",
        Language::Gujarati => "કટોકટીમાં કૉલ કરો",
    };

    format!(
        "{}\n\n({} / {})\n\n{}: {}",
        body, ENV_RELAY_URL, ENV_RELAY_KEY, emergency, EMERGENCY_HELPLINE
    )
}
