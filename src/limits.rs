pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_CUSTOM_CATEGORY_LEN: usize = 100;
pub const MAX_MATERIALS: usize = 16;
pub const MAX_MATERIAL_LEN: usize = 64;
pub const MAX_OWNER_LEN: usize = 320;
/// A 29-slot day can never hold more than 29 non-overlapping reservations;
/// the slack tolerates residual double-bookings awaiting manual cleanup.
pub const MAX_RESERVATIONS_PER_DAY: usize = 64;
pub const MAX_LINE_LEN: usize = 64 * 1024;
