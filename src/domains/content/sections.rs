//! The sales-page section registry.
//!
//! One immutable, compile-time table describing every content section: its
//! type key, display name, and ordered field specs (with which fields hold
//! images). The schema synchronizer, the content transformer and the
//! publish pipeline all consume this single registry, so the three can
//! never drift apart.

/// Field value kinds, mirroring the catalog's field definition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    SingleLineText,
    MultiLineText,
    RichText,
    FileReference,
}

impl FieldKind {
    /// The catalog's type name for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            FieldKind::SingleLineText => "single_line_text_field",
            FieldKind::MultiLineText => "multi_line_text_field",
            FieldKind::RichText => "rich_text_field",
            FieldKind::FileReference => "file_reference",
        }
    }
}

/// One field of a section.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub kind: FieldKind,
}

/// One logical content section of a sales page.
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl SectionSpec {
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Whether `key` is an image-valued (file reference) field.
    pub fn is_image_field(&self, key: &str) -> bool {
        self.field(key)
            .map(|f| f.kind == FieldKind::FileReference)
            .unwrap_or(false)
    }

    pub fn image_field_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::FileReference)
            .map(|f| f.key)
    }
}

/// Look up a section by its type key.
pub fn section(key: &str) -> Option<&'static SectionSpec> {
    SECTIONS.iter().find(|s| s.key == key)
}

const fn single(key: &'static str, name: &'static str) -> FieldSpec {
    FieldSpec { key, name, kind: FieldKind::SingleLineText }
}

const fn multi(key: &'static str, name: &'static str) -> FieldSpec {
    FieldSpec { key, name, kind: FieldKind::MultiLineText }
}

const fn rich(key: &'static str, name: &'static str) -> FieldSpec {
    FieldSpec { key, name, kind: FieldKind::RichText }
}

const fn file(key: &'static str, name: &'static str) -> FieldSpec {
    FieldSpec { key, name, kind: FieldKind::FileReference }
}

/// The 17 sales-page sections, in publish order.
pub static SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        key: "dynamic_buy_box",
        name: "Dynamic Buy Box",
        fields: &[
            single("product_main_headline", "Product Main Headline"),
            single("buybox_product_title", "Buybox Product Title"),
            rich("buybox_benefit_1_4", "Buybox Benefit 1-4"),
            multi("buybox_review_1", "Buybox Review 1"),
            multi("buybox_review_2", "Buybox Review 2"),
            multi("buybox_review_3", "Buybox Review 3"),
            single("guarantee_short", "Guarantee Short"),
        ],
    },
    SectionSpec {
        key: "problem_symptoms",
        name: "Problem Symptoms",
        fields: &[
            single("main_problem_headline", "Main Problem Headline"),
            file("symptom_1_image", "Symptom 1 Image"),
            single("symptom_1_headline", "Symptom 1 Headline"),
            multi("symptom_1_description", "Symptom 1 Description"),
            file("symptom_2_image", "Symptom 2 Image"),
            single("symptom_2_headline", "Symptom 2 Headline"),
            multi("symptom_2_description", "Symptom 2 Description"),
            file("symptom_3_image", "Symptom 3 Image"),
            single("symptom_3_headline", "Symptom 3 Headline"),
            multi("symptom_3_description", "Symptom 3 Description"),
            file("symptom_4_image", "Symptom 4 Image"),
            single("symptom_4_headline", "Symptom 4 Headline"),
            multi("symptom_4_description", "Symptom 4 Description"),
            file("symptom_5_image", "Symptom 5 Image"),
            single("symptom_5_headline", "Symptom 5 Headline"),
            multi("symptom_5_description", "Symptom 5 Description"),
            file("symptom_6_image", "Symptom 6 Image"),
            single("symptom_6_headline", "Symptom 6 Headline"),
            multi("symptom_6_description", "Symptom 6 Description"),
        ],
    },
    SectionSpec {
        key: "product_introduction",
        name: "Product Introduction",
        fields: &[
            single("product_intro_headline", "Product Intro Headline"),
            single("product_intro_subheadline", "Product Intro Subheadline"),
            rich("product_intro_description", "Product Intro Description"),
            file("feature_1_image", "Feature 1 Image"),
            single("feature_1_headline", "Feature 1 Headline"),
            multi("feature_1_description", "Feature 1 Description"),
            file("feature_2_image", "Feature 2 Image"),
            single("feature_2_headline", "Feature 2 Headline"),
            multi("feature_2_description", "Feature 2 Description"),
            file("feature_3_image", "Feature 3 Image"),
            single("feature_3_headline", "Feature 3 Headline"),
            multi("feature_3_description", "Feature 3 Description"),
            file("feature_4_image", "Feature 4 Image"),
            single("feature_4_headline", "Feature 4 Headline"),
            multi("feature_4_description", "Feature 4 Description"),
            file("feature_5_image", "Feature 5 Image"),
            single("feature_5_headline", "Feature 5 Headline"),
            multi("feature_5_description", "Feature 5 Description"),
            file("feature_6_image", "Feature 6 Image"),
            single("feature_6_headline", "Feature 6 Headline"),
            multi("feature_6_description", "Feature 6 Description"),
        ],
    },
    SectionSpec {
        key: "three_steps",
        name: "3 Steps",
        fields: &[
            single("3_steps_headline", "3 Steps Headline"),
            file("step_1_image", "Step 1 Image"),
            single("step_1_headline", "Step 1 Headline"),
            multi("step_1_description", "Step 1 Description"),
            file("step_2_image", "Step 2 Image"),
            single("step_2_headline", "Step 2 Headline"),
            multi("step_2_description", "Step 2 Description"),
            file("step_3_image", "Step 3 Image"),
            single("step_3_headline", "Step 3 Headline"),
            multi("step_3_description", "Step 3 Description"),
        ],
    },
    SectionSpec {
        key: "cta",
        name: "CTA",
        fields: &[
            single("button_text", "Button Text"),
            single("guarantee_long", "1 Line Guarantee Long"),
        ],
    },
    SectionSpec {
        key: "before_after_transformation",
        name: "Before After Transformation",
        fields: &[
            single("transformation_section_headline", "Transformation Section Headline"),
            file("transformation_1_image", "Transformation 1 Image"),
            single("transformation_1_headline", "Transformation 1 Headline"),
            multi("transformation_1_description", "Transformation 1 Description"),
            file("transformation_2_image", "Transformation 2 Image"),
            single("transformation_2_headline", "Transformation 2 Headline"),
            multi("transformation_2_description", "Transformation 2 Description"),
            file("transformation_3_image", "Transformation 3 Image"),
            single("transformation_3_headline", "Transformation 3 Headline"),
            multi("transformation_3_description", "Transformation 3 Description"),
            file("transformation_4_image", "Transformation 4 Image"),
            single("transformation_4_headline", "Transformation 4 Headline"),
            multi("transformation_4_description", "Transformation 4 Description"),
        ],
    },
    SectionSpec {
        key: "featured_reviews",
        name: "Featured Reviews",
        fields: &[
            single("featured_review_headline", "Featured Review Headline"),
            single("featured_review_name_1", "Featured Review Name 1"),
            multi("featured_review_description_1", "Featured Review Description 1"),
            single("featured_review_name_2", "Featured Review Name 2"),
            multi("featured_review_description_2", "Featured Review Description 2"),
            single("featured_review_name_3", "Featured Review Name 3"),
            multi("featured_review_description_3", "Featured Review Description 3"),
        ],
    },
    SectionSpec {
        key: "key_differences",
        name: "Key Differences",
        fields: &[
            single("key_differences_headline", "Key Differences Headline"),
            file("difference_1_image", "Difference 1 Image"),
            single("key_difference_title_1", "Key Difference Title 1"),
            multi("key_difference_description_1", "Key Difference Description 1"),
            file("difference_2_image", "Difference 2 Image"),
            single("key_difference_title_2", "Key Difference Title 2"),
            multi("key_difference_description_2", "Key Difference Description 2"),
            file("difference_3_image", "Difference 3 Image"),
            single("key_difference_title_3", "Key Difference Title 3"),
            multi("key_difference_description_3", "Key Difference Description 3"),
        ],
    },
    SectionSpec {
        key: "product_comparison",
        name: "Product Comparison",
        fields: &[
            single("product_comparison_headline", "Product Comparison Headline"),
            single("product_comparison_sub_headline", "Product Comparison Sub Headline"),
            single("comparison_1", "Comparison 1"),
            single("comparison_2", "Comparison 2"),
            single("comparison_3", "Comparison 3"),
            single("comparison_4", "Comparison 4"),
            single("comparison_5", "Comparison 5"),
            single("comparison_6", "Comparison 6"),
            single("comparison_7", "Comparison 7"),
            file("checkmark_icon", "Checkmark Icon"),
            file("x_icon", "X Icon"),
        ],
    },
    SectionSpec {
        key: "where_to_use",
        name: "Where To Use",
        fields: &[
            single("where_to_use_headline", "Where To Use Headline"),
            file("location_1_image", "Location 1 Image"),
            single("location_1_title", "Location 1 Title"),
            multi("location_1_description", "Location 1 Description"),
            file("location_2_image", "Location 2 Image"),
            single("location_2_title", "Location 2 Title"),
            multi("location_2_description", "Location 2 Description"),
            file("location_3_image", "Location 3 Image"),
            single("location_3_title", "Location 3 Title"),
            multi("location_3_description", "Location 3 Description"),
            file("location_4_image", "Location 4 Image"),
            single("location_4_title", "Location 4 Title"),
            multi("location_4_description", "Location 4 Description"),
            file("location_5_image", "Location 5 Image"),
            single("location_5_title", "Location 5 Title"),
            multi("location_5_description", "Location 5 Description"),
            file("location_6_image", "Location 6 Image"),
            single("location_6_title", "Location 6 Title"),
            multi("location_6_description", "Location 6 Description"),
        ],
    },
    SectionSpec {
        key: "who_its_for",
        name: "Who Its For",
        fields: &[
            single("who_is_this_for_headline", "Who Is This For Headline"),
            file("avatar_1_image", "Avatar 1 Image"),
            single("avatar_1_title", "Avatar 1 Title"),
            multi("avatar_1_description", "Avatar 1 Description"),
            file("avatar_2_image", "Avatar 2 Image"),
            single("avatar_2_title", "Avatar 2 Title"),
            multi("avatar_2_description", "Avatar 2 Description"),
            file("avatar_3_image", "Avatar 3 Image"),
            single("avatar_3_title", "Avatar 3 Title"),
            multi("avatar_3_description", "Avatar 3 Description"),
            file("avatar_4_image", "Avatar 4 Image"),
            single("avatar_4_title", "Avatar 4 Title"),
            multi("avatar_4_description", "Avatar 4 Description"),
            file("avatar_5_image", "Avatar 5 Image"),
            single("avatar_5_title", "Avatar 5 Title"),
            multi("avatar_5_description", "Avatar 5 Description"),
            file("avatar_6_image", "Avatar 6 Image"),
            single("avatar_6_title", "Avatar 6 Title"),
            multi("avatar_6_description", "Avatar 6 Description"),
        ],
    },
    SectionSpec {
        key: "maximize_results",
        name: "Maximize Results",
        fields: &[
            single("maximize_results_headline", "Maximize Results Headline"),
            file("maximize_results_1_image", "Maximize Results 1 Image"),
            single("maximize_results_title_1", "Maximize Results Title 1"),
            multi("maximize_results_description_1", "Maximize Results Description 1"),
            file("maximize_results_2_image", "Maximize Results 2 Image"),
            single("maximize_results_title_2", "Maximize Results Title 2"),
            multi("maximize_results_description_2", "Maximize Results Description 2"),
            file("maximize_results_3_image", "Maximize Results 3 Image"),
            single("maximize_results_title_3", "Maximize Results Title 3"),
            multi("maximize_results_description_3", "Maximize Results Description 3"),
        ],
    },
    SectionSpec {
        key: "cost_of_inaction",
        name: "Cost of Inaction",
        fields: &[
            single("cost_of_inaction_headline", "Cost Of Inaction Headline"),
            rich("cost_of_inaction_description", "Cost Of Inaction Description"),
        ],
    },
    SectionSpec {
        key: "choose_your_package",
        name: "Choose Your Package",
        fields: &[
            single("choose_your_package_headline", "Choose Your Package Headline"),
            single("why_buy_more_reason", "Why Buy More Reason"),
            file("package_1_image", "Package 1 Image"),
            single("package_1_title", "Package 1 Title"),
            single("package_1_sub_title", "Package 1 Sub Title"),
            single("package_1_strike_through_price", "Package 1 Strike Through Price"),
            single("package_1_savings", "Package 1 Savings"),
            file("package_2_image", "Package 2 Image"),
            single("package_2_title", "Package 2 Title"),
            single("package_2_sub_title", "Package 2 Sub Title"),
            single("package_2_strike_through_price", "Package 2 Strike Through Price"),
            single("package_2_savings", "Package 2 Savings"),
            file("package_3_image", "Package 3 Image"),
            single("package_3_title", "Package 3 Title"),
            single("package_3_sub_title", "Package 3 Sub Title"),
            single("package_3_strike_through_price", "Package 3 Strike Through Price"),
            single("package_3_savings", "Package 3 Savings"),
        ],
    },
    SectionSpec {
        key: "guarantee",
        name: "Guarantee",
        fields: &[
            single("guarantee_headline", "Guarantee Headline"),
            file("guarantee_seal_image", "Guarantee Seal Image"),
            multi("guarantee_description", "Guarantee Description"),
        ],
    },
    SectionSpec {
        key: "faq",
        name: "FAQ",
        fields: &[
            single("frequently_asked_questions_headline", "Frequently Asked Questions Headline"),
            single("faq_question_1", "FAQ Question 1"),
            multi("faq_answer_1", "FAQ Answer 1"),
            single("faq_question_2", "FAQ Question 2"),
            multi("faq_answer_2", "FAQ Answer 2"),
            single("faq_question_3", "FAQ Question 3"),
            multi("faq_answer_3", "FAQ Answer 3"),
            single("faq_question_4", "FAQ Question 4"),
            multi("faq_answer_4", "FAQ Answer 4"),
            single("faq_question_5", "FAQ Question 5"),
            multi("faq_answer_5", "FAQ Answer 5"),
            single("faq_question_6", "FAQ Question 6"),
            multi("faq_answer_6", "FAQ Answer 6"),
            single("faq_question_7", "FAQ Question 7"),
            multi("faq_answer_7", "FAQ Answer 7"),
        ],
    },
    SectionSpec {
        key: "store_credibility",
        name: "Store Credibility",
        fields: &[
            single("review_widget_headline", "Review Widget Headline"),
            file("store_benefit_1_image", "Store Benefit 1 Image"),
            single("store_benefit_1_title", "Store Benefit 1 Title"),
            multi("store_benefit_1_description", "Store Benefit 1 Description"),
            file("store_benefit_2_image", "Store Benefit 2 Image"),
            single("store_benefit_2_title", "Store Benefit 2 Title"),
            multi("store_benefit_2_description", "Store Benefit 2 Description"),
            file("store_benefit_3_image", "Store Benefit 3 Image"),
            single("store_benefit_3_title", "Store Benefit 3 Title"),
            multi("store_benefit_3_description", "Store Benefit 3 Description"),
            file("as_seen_in_logos_image", "As Seen In Logos"),
            single("browse_other_products_headline", "Browse Other Products Headline"),
        ],
    },
];

/// Type key of the master aggregate object.
pub const MASTER_TYPE: &str = "master_sales_page";

/// Display name of the master aggregate definition.
pub const MASTER_NAME: &str = "Master Sales Page";

/// Namespace/key of the product reference field pointing at the master.
pub const PRODUCT_FIELD_NAMESPACE: &str = "custom";
pub const PRODUCT_FIELD_KEY: &str = "master_sales_page";

/// Fallback content for the `three_steps` section when the AI output never
/// produced one; the master aggregate always carries this field.
pub static DEFAULT_THREE_STEPS: &[(&str, &str)] = &[
    ("3_steps_headline", "Get Results In 3 Simple Steps"),
    ("step_1_headline", "Step 1: Unbox It"),
    ("step_1_description", "Unpack your order and get familiar with what's included."),
    ("step_2_headline", "Step 2: Make It A Habit"),
    ("step_2_description", "Work it into your routine for a few minutes every day."),
    ("step_3_headline", "Step 3: See The Difference"),
    ("step_3_description", "Stick with it and watch the results build week after week."),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_has_seventeen_sections() {
        assert_eq!(SECTIONS.len(), 17);
    }

    #[test]
    fn section_keys_are_unique() {
        let keys: HashSet<_> = SECTIONS.iter().map(|s| s.key).collect();
        assert_eq!(keys.len(), SECTIONS.len());
    }

    #[test]
    fn field_keys_are_unique_within_each_section() {
        for section in SECTIONS {
            let keys: HashSet<_> = section.fields.iter().map(|f| f.key).collect();
            assert_eq!(keys.len(), section.fields.len(), "section {}", section.key);
        }
    }

    #[test]
    fn image_fields_are_file_references() {
        let guarantee = section("guarantee").unwrap();
        assert!(guarantee.is_image_field("guarantee_seal_image"));
        assert!(!guarantee.is_image_field("guarantee_headline"));
        assert!(!guarantee.is_image_field("nonexistent"));
        assert_eq!(
            guarantee.image_field_keys().collect::<Vec<_>>(),
            vec!["guarantee_seal_image"]
        );
    }

    #[test]
    fn default_three_steps_uses_declared_fields() {
        let spec = section("three_steps").unwrap();
        for (key, _) in DEFAULT_THREE_STEPS {
            assert!(spec.field(key).is_some(), "unknown default field {key}");
        }
    }
}
