//! Accepted header aliases per logical field.
//!
//! Feed exports rename their columns between versions. Each list is tried in
//! order and the first non-blank cell wins, so put the preferred header first.

/// Project (job) feed.
pub mod job {
    pub const EXTERNAL_ID: &[&str] = &[
        "Project ID",
        "ProjectID",
        "Project Number",
        "Project #",
        "Report Number",
        "Source ID",
        "External ID",
    ];
    pub const NAME: &[&str] = &["Project Name", "Project Title", "Title", "Name"];
    pub const DESCRIPTION: &[&str] = &[
        "Description",
        "Project Description",
        "Scope",
        "Scope of Work",
        "Details",
    ];
    pub const STREET: &[&str] = &[
        "Address",
        "Street",
        "Street Address",
        "Project Address",
        "Address 1",
        "Address Line 1",
    ];
    pub const CITY: &[&str] = &["City", "Project City"];
    pub const STATE: &[&str] = &["State", "Project State", "ST"];
    pub const ZIP: &[&str] = &["Zip", "Zip Code", "ZIP/Postal Code", "Postal Code"];
    pub const COUNTY: &[&str] = &["County", "Project County"];
    pub const CATEGORY: &[&str] = &[
        "Category",
        "Project Type",
        "Primary Project Type",
        "Building Use",
        "Type",
    ];
    pub const STATUS: &[&str] = &[
        "Status",
        "Project Status",
        "Stage",
        "Project Stage",
        "Work Type",
        "Type of Work",
    ];
    // Estimate high: the upper value column wins over the lower one.
    pub const VALUE: &[&str] = &[
        "Project Value",
        "Valuation",
        "Estimated Value",
        "High Value",
        "Low Value",
    ];
    pub const START_DATE: &[&str] = &[
        "Start Date",
        "Target Start",
        "Target Start Date",
        "Construction Start",
        "Est. Start",
        "Bid Date",
    ];
    pub const END_DATE: &[&str] = &[
        "End Date",
        "Completion Date",
        "Target Completion",
        "Target Completion Date",
        "Est. Completion",
    ];
    pub const CONTRACTOR: &[&str] = &["General Contractor", "Contractor", "GC"];
    pub const OWNER_NAME: &[&str] = &["Owner", "Owner Name", "Developer"];
    pub const ARCHITECT: &[&str] = &["Architect", "Design Firm"];
    pub const ENGINEER: &[&str] = &["Engineer", "Engineering Firm"];
}

/// Sales-activity feed (companies, contacts, interactions).
pub mod activity {
    pub const COMPANY_ID: &[&str] = &["Company ID", "Account ID", "Organization ID"];
    pub const COMPANY_NAME: &[&str] = &["Company", "Company Name", "Account", "Organization"];
    pub const INDUSTRY: &[&str] = &["Industry", "Company Type", "Trade"];
    pub const COMPANY_PHONE: &[&str] = &["Company Phone", "Main Phone", "Office Phone"];
    pub const WEBSITE: &[&str] = &["Website", "Web", "URL"];
    pub const CITY: &[&str] = &["City"];
    pub const STATE: &[&str] = &["State", "ST"];

    pub const CONTACT_ID: &[&str] = &["Contact ID", "Person ID"];
    pub const FIRST_NAME: &[&str] = &["First Name", "First"];
    pub const LAST_NAME: &[&str] = &["Last Name", "Last", "Surname"];
    pub const FULL_NAME: &[&str] = &["Contact", "Contact Name", "Full Name"];
    pub const EMAIL: &[&str] = &["Email", "E-mail", "Email Address"];
    pub const CONTACT_PHONE: &[&str] = &["Phone", "Direct Phone", "Mobile", "Cell"];
    pub const TITLE: &[&str] = &["Title", "Job Title", "Position"];

    pub const DATE: &[&str] = &["Date", "Activity Date", "Interaction Date", "Occurred On"];
    pub const KIND: &[&str] = &["Type", "Activity Type", "Interaction Type"];
    pub const NOTES: &[&str] = &["Notes", "Comments", "Summary", "Subject"];
}
