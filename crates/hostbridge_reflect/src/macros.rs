/// Declares a module holding the signature table of one host type.
///
/// ```ignore
/// bind_class! {
///     pub mod metadata: "host.storage.Metadata" {
///         methods {
///             GetSize: Required Instance "getSizeBytes" "()J",
///             GetMd5: Optional Instance "getMd5Hash" "()Lhost/lang/String;",
///         }
///         fields {}
///     }
/// }
///
/// metadata::binding().acquire(&ctx)?;
/// let size = metadata::binding().method(metadata::Method::GetSize);
/// ```
///
/// Append `(Optional)` after the class name when the type itself may be
/// missing, and a `natives { ... }` block evaluating to a
/// `Vec<NativeMethod>` to register callbacks on it.
#[macro_export]
macro_rules! bind_class {
    (
        $(#[$meta:meta])*
        $vis:vis mod $module:ident : $class_name:literal $( ( $class_req:ident ) )? {
            methods {
                $( $mvar:ident : $mreq:ident $mkind:ident $mname:literal $mdesc:literal ),* $(,)?
            }
            fields {
                $( $fvar:ident : $freq:ident $fkind:ident $fname:literal $fdesc:literal ),* $(,)?
            }
            $( natives $natives:block )?
        }
    ) => {
        $(#[$meta])*
        $vis mod $module {
            #[allow(unused_imports)]
            use super::*;

            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum Method {
                $( $mvar ),*
            }

            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum Field {
                $( $fvar ),*
            }

            impl $crate::MemberIndex for Method {
                fn index(self) -> usize {
                    match self {
                        $( Self::$mvar => Self::$mvar as usize ),*
                    }
                }
            }

            impl $crate::MemberIndex for Field {
                fn index(self) -> usize {
                    match self {
                        $( Self::$fvar => Self::$fvar as usize ),*
                    }
                }
            }

            pub struct Table;

            impl $crate::ClassTable for Table {
                const CLASS_NAME: &'static str = $class_name;
                const CLASS_REQUIREMENT: $crate::Requirement =
                    $crate::__class_requirement!($( $class_req )?);
                const METHODS: &'static [$crate::MemberSignature] = &[
                    $(
                        $crate::MemberSignature::new(
                            $mname,
                            $mdesc,
                            $crate::CallKind::$mkind,
                            $crate::Requirement::$mreq,
                        )
                    ),*
                ];
                const FIELDS: &'static [$crate::MemberSignature] = &[
                    $(
                        $crate::MemberSignature::new(
                            $fname,
                            $fdesc,
                            $crate::CallKind::$fkind,
                            $crate::Requirement::$freq,
                        )
                    ),*
                ];

                type Method = Method;
                type Field = Field;

                $(
                    fn natives() -> ::std::vec::Vec<$crate::NativeMethod> $natives
                )?
            }

            pub fn binding() -> $crate::Binding<'static, Table> {
                $crate::Binding::global()
            }

            pub fn binding_in(registry: &$crate::ClassRegistry) -> $crate::Binding<'_, Table> {
                $crate::Binding::in_registry(registry)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __class_requirement {
    () => {
        $crate::Requirement::Required
    };
    ($req:ident) => {
        $crate::Requirement::$req
    };
}
