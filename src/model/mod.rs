//! Entity model for procurement planning.

pub mod org;
pub mod ppmp;
pub mod records;
pub mod row;

pub use org::{AccountType, NewUser, Office, OfficeId, School, SchoolId, User, UserId, UserType};
pub use ppmp::{
    EndUser, EndUserType, HeaderRemark, NewPpmp, Ppmp, PpmpId, PpmpStatus, RemarkRole,
    StatusUpdate,
};
pub use records::{
    AppApproval, AuditLogEntry, BacApproval, NewAuditEntry, NewNotification, NewPurchaseRequest,
    NewPurchaseRequestItem, Notification, NotificationKind, PurchaseRequest, PurchaseRequestItem,
    PurchaseRequestStatus, BAC_APPROVAL_ACTION,
};
pub use row::{
    AppStatus, Attachment, ItemKey, Lot, LotItem, NewRowRemark, PpmpRow, ProcurementMode,
    ProjectType, RowDraft, RowFields, RowId, RowRemark,
};
