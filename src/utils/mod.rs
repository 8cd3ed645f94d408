pub mod phone_validation;
pub use phone_validation::{
    PhoneValidationError, clean_e164, normalize_phone_number, validate_phone_number,
};
pub mod xml;
pub use xml::{empty_twiml_response, escape_xml};
