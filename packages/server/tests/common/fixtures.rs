//! Test fixtures: salon profiles and model answers.

use pricelist_core::common::{Category, PriceVariant, PricingData, Service};
use pricelist_core::domains::audits::models::ScrapedProfile;
use serde_json::json;

pub const PROFILE_URL: &str = "https://booksy.com/pl-pl/12345_studio-urody-anna";

/// Two categories, five services. One service carries price variants.
pub fn sample_profile() -> ScrapedProfile {
    let manicure = Service {
        variants: Some(vec![
            PriceVariant {
                label: "Krótkie".to_string(),
                price: "100 zł".to_string(),
                ..Default::default()
            },
            PriceVariant {
                label: "Długie".to_string(),
                price: "130 zł".to_string(),
                ..Default::default()
            },
        ]),
        ..Service::new("Manicure hybrydowy", "od 100 zł")
    };

    ScrapedProfile {
        salon_name: Some("Studio Urody Anna".to_string()),
        address: Some("ul. Kwiatowa 5, Kraków".to_string()),
        logo_url: None,
        categories: vec![
            Category {
                name: "Brwi i rzęsy".to_string(),
                services: vec![
                    Service::new("Henna brwi", "40 zł"),
                    Service::new("Regulacja brwi", "30 zł"),
                ],
            },
            Category {
                name: "Paznokcie".to_string(),
                services: vec![
                    manicure,
                    Service::new("Pedicure", "150 zł"),
                    Service::new("Zdjęcie hybrydy", "30 zł"),
                ],
            },
        ],
    }
}

/// A single-category list, used where the content does not matter.
pub fn small_pricing() -> PricingData {
    PricingData::new(vec![Category {
        name: "Fryzjer".to_string(),
        services: vec![
            Service::new("Strzyżenie damskie", "90 zł"),
            Service::new("Modelowanie", "60 zł"),
        ],
    }])
}

/// Model answer for an audit.
pub fn audit_answer(score: i32) -> String {
    json!({
        "overallScore": score,
        "summary": "Czytelny cennik, brakuje opisów usług.",
        "strengths": ["Jasne ceny"],
        "weaknesses": ["Brak opisów", "Krótkie nazwy usług"],
        "recommendations": ["Dodaj opisy do każdej usługi"]
    })
    .to_string()
}

/// Model answer that adds a description to every service of `data`.
pub fn descriptions_answer(data: &PricingData) -> String {
    let services: Vec<_> = data
        .flat_services()
        .iter()
        .enumerate()
        .map(|(index, (_, service))| {
            json!({
                "index": index,
                "name": service.name,
                "description": format!("{} w przyjaznej atmosferze.", service.name),
                "price": service.price,
            })
        })
        .collect();

    json!({
        "services": services,
        "recommendations": ["Uzupełnij czas trwania usług"],
        "qualityScore": 82
    })
    .to_string()
}

/// Model answer with one entry missing.
pub fn truncated_answer(data: &PricingData) -> String {
    let services: Vec<_> = (0..data.services_count().saturating_sub(1))
        .map(|index| json!({ "index": index, "description": "Opis" }))
        .collect();
    json!({ "services": services }).to_string()
}
